use crate::libs::config::BalanceConfig;
use crate::libs::matrix::ContactRecord;
use crate::libs::norm::{is_valid_norm_value, NormalizationType};

/// Bias vectors over the union of contact lists sharing one bin space.
///
/// Records are one triangle of a symmetric matrix: an off-diagonal record
/// counts toward both of its bins.
pub struct NormalizationCalculations<'a> {
    lists: &'a [Vec<ContactRecord>],
    total_bins: usize,
}

impl<'a> NormalizationCalculations<'a> {
    pub fn new(lists: &'a [Vec<ContactRecord>], total_bins: usize) -> Self {
        NormalizationCalculations { lists, total_bins }
    }

    pub fn total_bins(&self) -> usize {
        self.total_bins
    }

    /// Usable records as `(x, y, count)`; non-positive counts and bins out of range are ignored
    fn records(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let n = self.total_bins;
        self.lists.iter().flatten().filter_map(move |r| {
            let count = r.counts as f64;
            if !(count.is_finite() && count > 0.0) {
                return None;
            }
            let x = usize::try_from(r.bin_x).ok().filter(|x| *x < n)?;
            let y = usize::try_from(r.bin_y).ok().filter(|y| *y < n)?;
            Some((x, y, count))
        })
    }

    /// Coverage of every bin
    pub fn row_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.total_bins];
        for (x, y, count) in self.records() {
            sums[x] += count;
            if x != y {
                sums[y] += count;
            }
        }
        sums
    }

    /// Bias vector of `norm`, or `None` when the matrix cannot be normalized.
    ///
    /// Bins without coverage are NaN. Every vector other than NONE is scaled
    /// so the normalized matrix keeps the raw total.
    pub fn compute_vector(&self, norm: NormalizationType, balance: &BalanceConfig) -> Option<Vec<f64>> {
        let mut vector = match norm {
            NormalizationType::None => return Some(vec![1.0; self.total_bins]),
            NormalizationType::Vc | NormalizationType::GwVc | NormalizationType::InterVc => {
                self.compute_vc()?
            }
            NormalizationType::VcSqrt => self.compute_vc()?.into_iter().map(f64::sqrt).collect(),
            NormalizationType::Kr | NormalizationType::GwKr | NormalizationType::InterKr => {
                self.compute_kr(balance)?
            }
        };

        let factor = self.sum_factor(&vector)?;
        for v in vector.iter_mut() {
            *v *= factor;
        }
        Some(vector)
    }

    fn compute_vc(&self) -> Option<Vec<f64>> {
        let vector: Vec<f64> = self
            .row_sums()
            .into_iter()
            .map(|s| if s > 0.0 { s } else { f64::NAN })
            .collect();
        if vector.iter().any(|v| is_valid_norm_value(*v)) {
            Some(vector)
        } else {
            None
        }
    }

    /// Symmetric matrix balancing.
    ///
    /// Scales `x` until every covered row of `diag(x) A diag(x)` sums to 1
    /// within the tolerance; the bias is `1 / x`.
    fn compute_kr(&self, balance: &BalanceConfig) -> Option<Vec<f64>> {
        let n = self.total_bins;
        let active: Vec<usize> = self
            .row_sums()
            .iter()
            .enumerate()
            .filter(|(_, s)| **s > 0.0)
            .map(|(i, _)| i)
            .collect();
        if active.is_empty() {
            return None;
        }

        let mut x = vec![1.0; n];
        let mut ax = vec![0.0; n];
        let mut marginals = vec![0.0; n];
        for iteration in 0..balance.max_iterations {
            ax.iter_mut().for_each(|v| *v = 0.0);
            for (i, j, count) in self.records() {
                ax[i] += count * x[j];
                if i != j {
                    ax[j] += count * x[i];
                }
            }

            let mut err: f64 = 0.0;
            for &i in &active {
                let m = x[i] * ax[i];
                if !(m.is_finite() && m > 0.0) {
                    return None;
                }
                marginals[i] = m;
                err = err.max((m - 1.0).abs());
            }

            if err < balance.tolerance {
                log::debug!("Balanced {} bins after {} iterations", active.len(), iteration);
                let mut bias = vec![f64::NAN; n];
                for &i in &active {
                    bias[i] = 1.0 / x[i];
                }
                return Some(bias);
            }

            for &i in &active {
                x[i] /= marginals[i].sqrt();
            }
        }

        log::debug!(
            "Balancing did not converge within {} iterations",
            balance.max_iterations
        );
        None
    }

    /// `sqrt(normSum / matrixSum)` over the cells both of whose bins are valid
    fn sum_factor(&self, vector: &[f64]) -> Option<f64> {
        let mut norm_sum = 0.0;
        let mut matrix_sum = 0.0;
        for (x, y, count) in self.records() {
            let (vx, vy) = (vector[x], vector[y]);
            if !(is_valid_norm_value(vx) && is_valid_norm_value(vy)) {
                continue;
            }
            let weight = if x == y { 1.0 } else { 2.0 };
            norm_sum += weight * count / (vx * vy);
            matrix_sum += weight * count;
        }
        let factor = (norm_sum / matrix_sum).sqrt();
        if factor.is_finite() && factor > 0.0 {
            Some(factor)
        } else {
            None
        }
    }
}
