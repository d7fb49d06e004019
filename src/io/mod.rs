//! File formats
//!
//! - `dense_file`: on-disk row-addressable matrix and its atomic writer
//! - `nifti_io`: volume ROIs from NIfTI-1 (`.nii`, `.nii.gz`)
//! - `text`: weight, area, and surface ROI value lists

pub mod dense_file;
pub mod nifti_io;
pub mod text;

pub use dense_file::*;
pub use nifti_io::*;
pub use text::*;
