pub mod libs;

pub use libs::error::{HicError, Result};
