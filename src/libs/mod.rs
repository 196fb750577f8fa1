pub mod annotation;
pub mod cache;
pub mod config;
pub mod custom;
pub mod dataset;
pub mod error;
pub mod matrix;
pub mod memory;
pub mod norm;
