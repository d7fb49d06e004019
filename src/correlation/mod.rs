//! Row correlation over brainordinate-mapped matrices
//!
//! - `stats`: per-row mean and root residual sum of squares, row preparation
//! - `row_cache`: bounded prepared-row cache and the memory capacity formula
//! - `roi`: ROI masks and the ROI-to-linear-index remapper
//! - `engine`: full and ROI-restricted correlation
//! - `average`: ROI-seed correlation averaged across inputs

pub mod average;
pub mod engine;
pub mod roi;
pub mod row_cache;
pub mod stats;

pub use average::*;
pub use engine::*;
pub use roi::*;
pub use row_cache::*;
pub use stats::*;
