//! Custom chromosomes stitched from regions of real ones.
//!
//! * [`anchor`] - Regions and their source/translated mappings.
//! * [`index`] - Per-chromosome index answering which mappings a bin range touches.
//! * [`assembler`] - Virtual matrix of a custom pair built from the source stores.

pub mod anchor;
pub mod assembler;
pub mod index;

pub use anchor::{MotifAnchor, RegionMapping, RegionPair};
pub use assembler::{remap_block, resign_block_number, CustomMatrixZoomData};
pub use index::SpatialRegionIndex;
