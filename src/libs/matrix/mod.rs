//! Contact matrices of one dataset.
//!
//! * [`zoom`] - Resolution units and bin sizes.
//! * [`chrom`] - Chromosome registry, custom chromosomes included.
//! * [`record`] - Contact records and blocks.
//! * [`codec`] - Raw block bytes to records and back.
//! * [`layout`] - Block tiling and region to block-number resolution.
//! * [`loader`] - Bounded pool decoding blocks with join-all semantics.
//! * [`zoom_data`] - The block store of one chromosome pair at one zoom.

pub mod chrom;
pub mod codec;
pub mod layout;
pub mod loader;
pub mod record;
pub mod zoom;
pub mod zoom_data;

pub use chrom::{Chromosome, ChromosomeHandler, ALL_CHROMOSOME};
pub use layout::BlockLayout;
pub use loader::{BlockLoader, LoadOutcome, LoadTask};
pub use record::{Block, ContactRecord};
pub use zoom::{Unit, Zoom};
pub use zoom_data::{MatrixKey, MatrixZoomData};
