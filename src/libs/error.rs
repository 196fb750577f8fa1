//! Error taxonomy of the crate.

use thiserror::Error;

use crate::libs::matrix::Zoom;
use crate::libs::norm::NormalizationType;

#[derive(Error, Debug)]
pub enum HicError {
    /// I/O errors from the reader boundary or the footer writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated raw block bytes
    #[error("Block {block} could not be decoded: {message}")]
    BlockDecode { block: i64, message: String },

    /// The requested normalization vector is missing for a chromosome/zoom
    #[error("Normalization {norm} is not available for chromosome {chr}")]
    NormalizationUnavailable { norm: NormalizationType, chr: usize },

    /// Genome-wide bin count does not fit the record index type
    #[error("Genome-wide bin count {bins} at {zoom} exceeds the index range")]
    GenomeTooLarge { zoom: Zoom, bins: u64 },

    /// Invalid arguments (unknown chromosome, empty region, bad bin size)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration values out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Text input errors
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, HicError>;

impl HicError {
    pub fn decode(block: i64, message: impl Into<String>) -> Self {
        Self::BlockDecode {
            block,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
