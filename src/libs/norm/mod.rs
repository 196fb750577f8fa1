//! Bias vectors and distance-decay curves.
//!
//! * [`types`] - Normalization kinds.
//! * [`vector`] - Per-chromosome bias vectors and normalized counts.
//! * [`calc`] - Coverage and matrix balancing over contact lists.
//! * [`expected`] - Expected counts by genomic distance.
//! * [`genome_wide`] - Genome-wide coordinate space, genome-wide and per-chromosome vectors.
//! * [`footer`] - Byte layout of the normalization footer.
//! * [`updater`] - Batch pass recomputing vectors and rewriting the footer.

pub mod calc;
pub mod expected;
pub mod footer;
pub mod genome_wide;
pub mod types;
pub mod updater;
pub mod vector;

pub use calc::NormalizationCalculations;
pub use expected::{DistanceBinning, ExpectedValueCalculation, ExpectedValueFunction};
pub use genome_wide::{
    build_genome_wide_records, compute_chromosome_vectors, compute_genome_wide_vectors,
    GenomeWideLayout, NormalizationResult,
};
pub use types::NormalizationType;
pub use updater::{add_genome_wide_norms, update_norm_footer, NormUpdate, NormUpdateReport};
pub use vector::{is_valid_norm_value, normalized_count, NormalizationVector};
