//! Distance-decay expected counts.

use std::collections::BTreeMap;

use crate::libs::matrix::{ChromosomeHandler, Zoom};
use crate::libs::norm::NormalizationType;

/// Reads a smoothing window must hold
const SHOT_NOISE_MIN_READS: f64 = 400.0;

/// How genomic distances (in bins) are grouped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceBinning {
    /// One bin per distance
    Linear,
    /// `floor(log_base(1 + d))`
    Log { base: f64 },
}

impl DistanceBinning {
    pub fn bin(&self, distance: u64) -> usize {
        match self {
            DistanceBinning::Linear => distance as usize,
            DistanceBinning::Log { base } => ((1.0 + distance as f64).ln() / base.ln()).floor() as usize,
        }
    }

    /// Number of bins needed for distances in `[0, max_distance]`
    pub fn bin_count(&self, max_distance: u64) -> usize {
        self.bin(max_distance) + 1
    }
}

pub struct ExpectedValueCalculation {
    zoom: Zoom,
    norm: NormalizationType,
    binning: DistanceBinning,
    /// Bins per chromosome index
    chromosomes: BTreeMap<usize, u64>,
    /// Observed weight per chromosome
    chromosome_counts: BTreeMap<usize, f64>,
    actual_distances: Vec<f64>,
}

impl ExpectedValueCalculation {
    /// Covers the real chromosomes of `handler`
    pub fn new(handler: &ChromosomeHandler, zoom: Zoom, norm: NormalizationType, binning: DistanceBinning) -> Self {
        let chromosomes: BTreeMap<usize, u64> = handler
            .real_chromosomes()
            .map(|c| (c.index, c.bin_count(zoom.bin_size())))
            .collect();
        Self::with_bins(chromosomes, zoom, norm, binning)
    }

    /// Explicit bin counts per chromosome index
    pub fn with_bins(
        chromosomes: BTreeMap<usize, u64>,
        zoom: Zoom,
        norm: NormalizationType,
        binning: DistanceBinning,
    ) -> Self {
        let max_bins = chromosomes.values().copied().max().unwrap_or(1).max(1);
        ExpectedValueCalculation {
            zoom,
            norm,
            binning,
            chromosomes,
            chromosome_counts: BTreeMap::new(),
            actual_distances: vec![0.0; binning.bin_count(max_bins - 1)],
        }
    }

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn norm(&self) -> NormalizationType {
        self.norm
    }

    /// Adds one contact of chromosome `chr_idx`; unknown chromosomes and
    /// unusable weights are ignored.
    pub fn add_distance(&mut self, chr_idx: usize, bin_x: i32, bin_y: i32, weight: f64) {
        if !self.chromosomes.contains_key(&chr_idx) || !weight.is_finite() {
            return;
        }
        let distance = (bin_x as i64 - bin_y as i64).unsigned_abs();
        let idx = self.binning.bin(distance);
        if idx >= self.actual_distances.len() {
            self.actual_distances.resize(idx + 1, 0.0);
        }
        self.actual_distances[idx] += weight;
        *self.chromosome_counts.entry(chr_idx).or_insert(0.0) += weight;
    }

    pub fn has_data(&self) -> bool {
        !self.chromosome_counts.is_empty()
    }

    /// Cells at each distance bin, summed over chromosomes
    fn possible_distances(&self) -> Vec<f64> {
        let mut possible = vec![0.0; self.actual_distances.len()];
        for &bins in self.chromosomes.values() {
            for d in 0..bins {
                let idx = self.binning.bin(d);
                if idx < possible.len() {
                    possible[idx] += (bins - d) as f64;
                }
            }
        }
        possible
    }

    /// Smoothed density per distance bin
    fn density(&self) -> Vec<f64> {
        let actual = &self.actual_distances;
        let possible = self.possible_distances();
        let n = actual.len();
        let mut density = vec![0.0; n];
        if n == 0 {
            return density;
        }

        let mut num_sum = actual[0];
        let mut den_sum = possible[0];
        let mut bound1 = 0;
        let mut bound2 = 0;
        for ii in 0..n {
            if num_sum < SHOT_NOISE_MIN_READS {
                while num_sum < SHOT_NOISE_MIN_READS && bound2 + 1 < n {
                    bound2 += 1;
                    num_sum += actual[bound2];
                    den_sum += possible[bound2];
                }
            } else if bound2 > bound1 {
                while bound2 > bound1 + 1
                    && num_sum - actual[bound1] - actual[bound2] >= SHOT_NOISE_MIN_READS
                {
                    num_sum -= actual[bound1] + actual[bound2];
                    den_sum -= possible[bound1] + possible[bound2];
                    bound1 += 1;
                    bound2 -= 1;
                }
            }

            density[ii] = if den_sum > 0.0 { num_sum / den_sum } else { 0.0 };

            // keep the window centered on the next distance
            if bound2 + 2 < n {
                num_sum += actual[bound2 + 1] + actual[bound2 + 2];
                den_sum += possible[bound2 + 1] + possible[bound2 + 2];
                bound2 += 2;
            } else if bound2 + 1 < n {
                num_sum += actual[bound2 + 1];
                den_sum += possible[bound2 + 1];
                bound2 += 1;
            }
        }
        density
    }

    /// Smoothed curve plus the per-chromosome factors
    pub fn compute_function(&self) -> ExpectedValueFunction {
        let density = self.density();

        let mut factors = BTreeMap::new();
        for (chr, &bins) in &self.chromosomes {
            let observed = match self.chromosome_counts.get(chr) {
                Some(o) if *o > 0.0 => *o,
                _ => continue,
            };
            let expected: f64 = (0..bins)
                .filter_map(|d| density.get(self.binning.bin(d)).map(|v| (bins - d) as f64 * v))
                .sum();
            factors.insert(*chr, expected / observed);
        }

        ExpectedValueFunction {
            zoom: self.zoom,
            norm: self.norm,
            binning: self.binning,
            values: density,
            factors,
        }
    }
}

/// Expected count as a function of distance for one zoom and normalization
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedValueFunction {
    pub zoom: Zoom,
    pub norm: NormalizationType,
    pub binning: DistanceBinning,
    /// Density per distance bin
    pub values: Vec<f64>,
    /// Chromosome index to fudge factor
    pub factors: BTreeMap<usize, f64>,
}

impl ExpectedValueFunction {
    /// `UNIT_BINSIZE_NORM`, e.g. `BP_50000_KR`
    pub fn key_for(zoom: Zoom, norm: NormalizationType) -> String {
        format!("{}_{}", zoom, norm)
    }

    pub fn key(&self) -> String {
        Self::key_for(self.zoom, self.norm)
    }

    /// Expected count at `distance` bins on chromosome `chr_idx`.
    ///
    /// Distances past the curve use its last value; chromosomes without a
    /// factor are not rescaled.
    pub fn expected_value(&self, chr_idx: usize, distance: u64) -> f64 {
        let idx = self.binning.bin(distance);
        let value = match self.values.get(idx).or_else(|| self.values.last()) {
            Some(v) => *v,
            None => return f64::NAN,
        };
        match self.factors.get(&chr_idx) {
            Some(f) if *f > 0.0 => value / f,
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calc(bins: &[(usize, u64)], binning: DistanceBinning) -> ExpectedValueCalculation {
        ExpectedValueCalculation::with_bins(
            bins.iter().copied().collect(),
            Zoom::bp(1000).unwrap(),
            NormalizationType::Kr,
            binning,
        )
    }

    #[test]
    fn test_log_binning() {
        let log2 = DistanceBinning::Log { base: 2.0 };
        assert_eq!(log2.bin(0), 0);
        assert_eq!(log2.bin(1), 1);
        assert_eq!(log2.bin(2), 1);
        assert_eq!(log2.bin(3), 2);
        assert_eq!(log2.bin_count(7), 4);
        assert_eq!(DistanceBinning::Linear.bin(7), 7);
    }

    #[test]
    fn test_uniform_density() {
        // every cell of a 30-bin chromosome holds 50
        let mut calc = calc(&[(1, 30)], DistanceBinning::Linear);
        for x in 0..30 {
            for y in x..30 {
                calc.add_distance(1, x, y, 50.0);
            }
        }
        let f = calc.compute_function();
        assert_eq!(f.values.len(), 30);
        for v in &f.values {
            assert_relative_eq!(*v, 50.0, max_relative = 1e-9);
        }
        assert_relative_eq!(f.factors[&1], 1.0, max_relative = 1e-9);
        assert_relative_eq!(f.expected_value(1, 3), 50.0, max_relative = 1e-9);
        assert_relative_eq!(f.expected_value(1, 1000), 50.0, max_relative = 1e-9);
    }

    #[test]
    fn test_factors_match_observed_totals() {
        let mut calc = calc(&[(1, 20), (2, 10)], DistanceBinning::Linear);
        for x in 0..20 {
            for y in x..20 {
                calc.add_distance(1, x, y, 1000.0 / (1 + y - x) as f64);
            }
        }
        for x in 0..10 {
            for y in x..10 {
                calc.add_distance(2, x, y, 3000.0 / (1 + y - x) as f64);
            }
        }
        // unknown chromosomes are ignored
        calc.add_distance(5, 0, 0, 1e9);

        let f = calc.compute_function();
        for (chr, bins, scale) in [(1usize, 20i32, 1000.0), (2, 10, 3000.0)] {
            let observed: f64 = (0..bins)
                .flat_map(|x| (x..bins).map(move |y| scale / (1 + y - x) as f64))
                .sum();
            let expected: f64 = (0..bins as u64)
                .map(|d| (bins as u64 - d) as f64 * f.expected_value(chr, d))
                .sum();
            assert_relative_eq!(expected, observed, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_sparse_tail_is_smoothed() {
        let mut calc = calc(&[(1, 100)], DistanceBinning::Linear);
        calc.add_distance(1, 0, 0, 500.0);
        calc.add_distance(1, 10, 60, 5.0);
        let f = calc.compute_function();
        assert!(f.values.iter().all(|v| v.is_finite() && *v >= 0.0));
        // the lone far contact is spread over a window
        assert!(f.values[50] < 5.0);
    }

    #[test]
    fn test_key() {
        let f = calc(&[(1, 4)], DistanceBinning::Linear).compute_function();
        assert_eq!(f.key(), "BP_1000_KR");
        assert!(f.factors.is_empty());
    }
}
