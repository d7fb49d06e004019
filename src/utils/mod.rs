//! Utility functions for row processing
//!
//! This module provides:
//! - SIMD-accelerated reductions with double-precision accumulation
//!   (optional, with `simd` feature)

pub mod simd_ops;

pub use simd_ops::*;
