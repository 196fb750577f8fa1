use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::libs::error::HicError;

lazy_static! {
    static ref BIN_SIZE_RE: Regex =
        Regex::new(r"^(?P<num>\d+(?:\.\d+)?)(?P<suffix>[kKmMf]?)$").unwrap();
}

/// Resolution unit of a matrix view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    Bp,
    Frag,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Bp => "BP",
            Unit::Frag => "FRAG",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Unit {
    type Err = HicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BP" => Ok(Unit::Bp),
            "FRAG" => Ok(Unit::Frag),
            _ => Err(HicError::invalid(format!("Unknown unit: {}", s))),
        }
    }
}

/// (unit, bin size); immutable once created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zoom {
    unit: Unit,
    bin_size: u32,
}

impl Zoom {
    pub fn new(unit: Unit, bin_size: u32) -> Result<Self, HicError> {
        if bin_size == 0 {
            return Err(HicError::invalid("Bin size must be positive"));
        }
        Ok(Zoom { unit, bin_size })
    }

    pub fn bp(bin_size: u32) -> Result<Self, HicError> {
        Self::new(Unit::Bp, bin_size)
    }

    pub fn frag(bin_size: u32) -> Result<Self, HicError> {
        Self::new(Unit::Frag, bin_size)
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn bin_size(&self) -> u32 {
        self.bin_size
    }

    /// Parses resolution tokens such as `2.5M`, `500k`, `10000` or `500f`.
    ///
    /// ```
    /// use hicmx::libs::matrix::{Unit, Zoom};
    /// let zoom = Zoom::parse("2.5M").unwrap();
    /// assert_eq!(zoom.bin_size(), 2_500_000);
    /// assert_eq!(Zoom::parse("500f").unwrap().unit(), Unit::Frag);
    /// assert!(Zoom::parse("fifty").is_none());
    /// ```
    pub fn parse(token: &str) -> Option<Self> {
        let caps = BIN_SIZE_RE.captures(token.trim())?;
        let num: f64 = caps["num"].parse().ok()?;
        let (unit, scale) = match &caps["suffix"] {
            "k" | "K" => (Unit::Bp, 1_000.0),
            "m" | "M" => (Unit::Bp, 1_000_000.0),
            "f" => (Unit::Frag, 1.0),
            _ => (Unit::Bp, 1.0),
        };
        let value = num * scale;
        if value.fract() != 0.0 || value < 1.0 || value > u32::MAX as f64 {
            return None;
        }
        Zoom::new(unit, value as u32).ok()
    }
}

impl fmt::Display for Zoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.unit, self.bin_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bp_tokens() {
        assert_eq!(Zoom::parse("1M"), Some(Zoom::bp(1_000_000).unwrap()));
        assert_eq!(Zoom::parse("250k"), Some(Zoom::bp(250_000).unwrap()));
        assert_eq!(Zoom::parse("2.5m"), Some(Zoom::bp(2_500_000).unwrap()));
        assert_eq!(Zoom::parse("5000"), Some(Zoom::bp(5000).unwrap()));
    }

    #[test]
    fn test_parse_frag_tokens() {
        assert_eq!(Zoom::parse("1f"), Some(Zoom::frag(1).unwrap()));
        assert_eq!(Zoom::parse("200f"), Some(Zoom::frag(200).unwrap()));
    }

    #[test]
    fn test_parse_rejects() {
        assert!(Zoom::parse("").is_none());
        assert!(Zoom::parse("0").is_none());
        assert!(Zoom::parse("1.5").is_none());
        assert!(Zoom::parse("2.5f").is_none());
        assert!(Zoom::parse("10kb").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Zoom::bp(50000).unwrap().to_string(), "BP_50000");
        assert_eq!("frag".parse::<Unit>().unwrap(), Unit::Frag);
        assert!(Zoom::bp(0).is_err());
    }
}
