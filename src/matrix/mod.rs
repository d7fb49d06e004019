//! Row-addressable matrices
//!
//! This module provides:
//! - `RowMatrix`: whole-row reads from a resident or on-disk source
//! - `CiftiSink`: whole-row writes into an output with its own header
//! - `InMemoryMatrix`: a resident implementation of both

pub mod memory;

pub use memory::*;

use crate::cifti::CiftiXml;
use crate::error::Result;

/// Source matrix readable one whole row at a time.
///
/// Implementations must tolerate reads from several threads, but callers in
/// this crate serialize reads of non-resident matrices themselves.
pub trait RowMatrix: Sync {
    fn cifti_xml(&self) -> &CiftiXml;

    fn num_rows(&self) -> usize {
        self.cifti_xml().num_rows()
    }

    fn num_cols(&self) -> usize {
        self.cifti_xml().num_cols()
    }

    /// Whether every row is already resident.
    fn is_in_memory(&self) -> bool;

    /// Copy row `row` into `out`, which must hold `num_cols()` values.
    fn read_row(&self, row: usize, out: &mut [f32]) -> Result<()>;
}

/// Destination written one whole row at a time.
pub trait CiftiSink {
    /// Fix the output header. Must be called before any `set_row`.
    fn set_cifti_xml(&mut self, xml: CiftiXml) -> Result<()>;

    fn set_row(&mut self, row: usize, data: &[f32]) -> Result<()>;
}
