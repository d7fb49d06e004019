//! cifti-correlation: brainordinate-mapped connectivity matrices
//!
//! This crate maps the axes of large row-addressable matrices onto
//! brainordinates (surface vertices, voxels, parcels, scalar maps, series)
//! and computes pairwise row correlation under a bounded memory budget.
//!
//! # Modules
//! - `cifti`: structures, volume spaces, and per-axis index maps
//! - `matrix`: row-addressable sources and sinks, resident matrices
//! - `correlation`: row statistics, row cache, ROI remapping, the engine,
//!   and averaged ROI-seed correlation
//! - `io`: dense matrix files, NIfTI volume ROIs, text value lists
//! - `utils`: double-precision reduction kernels

pub mod cifti;
pub mod correlation;
pub mod error;
pub mod io;
pub mod matrix;
pub mod utils;

use std::time::Instant;

use tracing::info;

pub use cifti::{CiftiXml, IndexMap, Structure, VolumeSpace};
pub use correlation::{CorrelationEngine, CorrelationOptions, RoiMasks, SurfaceRoi, VertexAreas, VolumeRoi};
pub use error::{CiftiError, Result};
pub use matrix::{CiftiSink, InMemoryMatrix, RowMatrix};

// ============================================================================
// Entry points
// ============================================================================

/// Correlate every row of `matrix` with every row, writing a square matrix
/// into `out`.
pub fn correlate_all(matrix: &dyn RowMatrix, out: &mut dyn CiftiSink, options: &CorrelationOptions) -> Result<CiftiXml> {
    info!(
        "correlate_all: {} rows x {} columns, fisher_z={}, mem_limit={:?}",
        matrix.num_rows(),
        matrix.num_cols(),
        options.fisher_z,
        options.mem_limit_gb
    );
    let start = Instant::now();
    let xml = correlation::engine::correlate_all(matrix, out, options)?;
    info!("correlate_all complete in {:.2?}", start.elapsed());
    Ok(xml)
}

/// Correlate the rows of `matrix` inside `rois` with every row.
pub fn correlate_roi(
    matrix: &dyn RowMatrix,
    rois: &RoiMasks,
    out: &mut dyn CiftiSink,
    options: &CorrelationOptions,
) -> Result<CiftiXml> {
    info!(
        "correlate_roi: {} rows x {} columns, fisher_z={}, mem_limit={:?}",
        matrix.num_rows(),
        matrix.num_cols(),
        options.fisher_z,
        options.mem_limit_gb
    );
    let start = Instant::now();
    let xml = correlation::engine::correlate_roi(matrix, rois, out, options)?;
    info!(
        "correlate_roi complete: {} output rows in {:.2?}",
        xml.num_rows(),
        start.elapsed()
    );
    Ok(xml)
}

/// Average the Fisher-z ROI-seed correlation over `inputs`.
pub fn average_roi_correlation(
    inputs: &[&dyn RowMatrix],
    rois: &RoiMasks,
    areas: &VertexAreas,
    out: &mut dyn CiftiSink,
) -> Result<CiftiXml> {
    info!("average_roi_correlation: {} inputs", inputs.len());
    let start = Instant::now();
    let xml = correlation::average::average_roi_correlation(inputs, rois, areas, out)?;
    info!(
        "average_roi_correlation complete: {} maps in {:.2?}",
        xml.num_cols(),
        start.elapsed()
    );
    Ok(xml)
}
