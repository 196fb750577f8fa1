//! Runtime knobs for the query path and the batch passes.

use std::time::Duration;

use crate::libs::error::{HicError, Result};
use crate::libs::norm::{DistanceBinning, NormalizationType};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Keep decoded blocks in the shared cache
    pub use_cache: bool,
    /// Maximum number of cached blocks
    pub cache_capacity: usize,
    /// Worker threads decoding blocks
    pub loader_threads: usize,
    /// Abandon a block batch after this long; missing blocks become empty
    pub fetch_timeout: Option<Duration>,
    /// Individual loader failures written to the log per batch
    pub max_reported_errors: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            use_cache: true,
            cache_capacity: 4096,
            loader_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            fetch_timeout: None,
            max_reported_errors: 5,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.use_cache && self.cache_capacity == 0 {
            return Err(HicError::config("cache_capacity must be positive when caching"));
        }
        if self.loader_threads == 0 {
            return Err(HicError::config("loader_threads must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BalanceConfig {
    /// Largest accepted deviation of a balanced row sum from 1
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        BalanceConfig {
            tolerance: 1e-6,
            max_iterations: 500,
        }
    }
}

impl BalanceConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(HicError::config("tolerance must be a positive number"));
        }
        if self.max_iterations == 0 {
            return Err(HicError::config("max_iterations must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NormUpdateConfig {
    /// Finest BP resolution that gets genome-wide vectors; below 10 kb disables them
    pub genome_wide_resolution: u32,
    /// Per-chromosome normalizations recomputed by the pass
    pub chromosome_norms: Vec<NormalizationType>,
    pub balance: BalanceConfig,
    pub binning: DistanceBinning,
}

impl Default for NormUpdateConfig {
    fn default() -> Self {
        NormUpdateConfig {
            genome_wide_resolution: 1_000_000,
            chromosome_norms: vec![
                NormalizationType::Vc,
                NormalizationType::VcSqrt,
                NormalizationType::Kr,
            ],
            balance: BalanceConfig::default(),
            binning: DistanceBinning::Linear,
        }
    }
}

impl NormUpdateConfig {
    pub fn validate(&self) -> Result<()> {
        self.balance.validate()?;
        if let Some(norm) = self
            .chromosome_norms
            .iter()
            .find(|n| n.is_genome_wide() || **n == NormalizationType::None)
        {
            return Err(HicError::config(format!(
                "{} is not a per-chromosome normalization",
                norm
            )));
        }
        if let DistanceBinning::Log { base } = self.binning {
            if !(base > 1.0 && base.is_finite()) {
                return Err(HicError::config("log binning base must be greater than 1"));
            }
        }
        Ok(())
    }
}
