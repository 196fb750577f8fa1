use crate::libs::matrix::Zoom;
use crate::libs::norm::NormalizationType;

/// Per-bin bias values of one chromosome at one zoom.
///
/// NaN marks a bin that cannot be normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationVector {
    norm: NormalizationType,
    chr_idx: usize,
    zoom: Zoom,
    data: Vec<f64>,
}

/// Finite and strictly positive
pub fn is_valid_norm_value(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

impl NormalizationVector {
    pub fn new(norm: NormalizationType, chr_idx: usize, zoom: Zoom, data: Vec<f64>) -> Self {
        NormalizationVector {
            norm,
            chr_idx,
            zoom,
            data,
        }
    }

    pub fn from_floats(norm: NormalizationType, chr_idx: usize, zoom: Zoom, data: &[f32]) -> Self {
        Self::new(norm, chr_idx, zoom, data.iter().map(|v| *v as f64).collect())
    }

    pub fn norm(&self) -> NormalizationType {
        self.norm
    }

    pub fn chr_idx(&self) -> usize {
        self.chr_idx
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bias of `bin` when it is usable
    pub fn value(&self, bin: i64) -> Option<f64> {
        usize::try_from(bin)
            .ok()
            .and_then(|i| self.data.get(i))
            .copied()
            .filter(|v| is_valid_norm_value(*v))
    }

    pub fn to_floats(&self) -> Vec<f32> {
        self.data.iter().map(|v| *v as f32).collect()
    }
}

/// `count / (nv1[x] * nv2[y])`, NaN when either bias is unusable
pub fn normalized_count(counts: f32, nv1: &NormalizationVector, nv2: &NormalizationVector, bin_x: i32, bin_y: i32) -> f32 {
    match (nv1.value(bin_x as i64), nv2.value(bin_y as i64)) {
        (Some(vx), Some(vy)) => (counts as f64 / (vx * vy)) as f32,
        _ => f32::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values() {
        let zoom = Zoom::bp(100).unwrap();
        let nv = NormalizationVector::new(
            NormalizationType::Vc,
            1,
            zoom,
            vec![2.0, f64::NAN, 0.0, 4.0],
        );
        assert_eq!(nv.value(0), Some(2.0));
        assert_eq!(nv.value(1), None);
        assert_eq!(nv.value(2), None);
        assert_eq!(nv.value(9), None);
        assert_eq!(nv.value(-1), None);

        assert_eq!(normalized_count(16.0, &nv, &nv, 0, 3), 2.0);
        assert!(normalized_count(16.0, &nv, &nv, 0, 1).is_nan());
    }
}
