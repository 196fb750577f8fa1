use std::fmt;
use std::str::FromStr;

use crate::libs::error::HicError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NormalizationType {
    None,
    Vc,
    VcSqrt,
    Kr,
    GwKr,
    GwVc,
    InterKr,
    InterVc,
}

impl NormalizationType {
    pub fn label(&self) -> &'static str {
        match self {
            NormalizationType::None => "NONE",
            NormalizationType::Vc => "VC",
            NormalizationType::VcSqrt => "VC_SQRT",
            NormalizationType::Kr => "KR",
            NormalizationType::GwKr => "GW_KR",
            NormalizationType::GwVc => "GW_VC",
            NormalizationType::InterKr => "INTER_KR",
            NormalizationType::InterVc => "INTER_VC",
        }
    }

    pub fn all() -> [NormalizationType; 8] {
        [
            NormalizationType::None,
            NormalizationType::Vc,
            NormalizationType::VcSqrt,
            NormalizationType::Kr,
            NormalizationType::GwKr,
            NormalizationType::GwVc,
            NormalizationType::InterKr,
            NormalizationType::InterVc,
        ]
    }

    pub fn genome_wide() -> [NormalizationType; 4] {
        [
            NormalizationType::GwKr,
            NormalizationType::GwVc,
            NormalizationType::InterKr,
            NormalizationType::InterVc,
        ]
    }

    pub fn is_genome_wide(&self) -> bool {
        matches!(
            self,
            NormalizationType::GwKr
                | NormalizationType::GwVc
                | NormalizationType::InterKr
                | NormalizationType::InterVc
        )
    }

    /// Genome-wide types that also balance intra-chromosome contacts
    pub fn includes_intra(&self) -> bool {
        matches!(self, NormalizationType::GwKr | NormalizationType::GwVc)
    }

    pub fn is_balanced(&self) -> bool {
        matches!(
            self,
            NormalizationType::Kr | NormalizationType::GwKr | NormalizationType::InterKr
        )
    }
}

impl fmt::Display for NormalizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for NormalizationType {
    type Err = HicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NormalizationType::all()
            .into_iter()
            .find(|n| n.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| HicError::invalid(format!("Unknown normalization: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for norm in NormalizationType::all() {
            assert_eq!(norm.label().parse::<NormalizationType>().unwrap(), norm);
        }
        assert_eq!("vc_sqrt".parse::<NormalizationType>().unwrap(), NormalizationType::VcSqrt);
        assert!("SCALE".parse::<NormalizationType>().is_err());
    }

    #[test]
    fn test_groups() {
        assert!(NormalizationType::GwKr.includes_intra());
        assert!(!NormalizationType::InterVc.includes_intra());
        assert!(NormalizationType::InterVc.is_genome_wide());
        assert!(!NormalizationType::Kr.is_genome_wide());
        assert!(NormalizationType::InterKr.is_balanced());
    }
}
