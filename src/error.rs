//! Error types for cifti-correlation.

use thiserror::Error;

use crate::cifti::Structure;

/// Top-level error type for mapping construction, correlation, and file access.
#[derive(Debug, Error)]
pub enum CiftiError {
    // Configuration errors, raised before any row is read.
    #[error("memory limit cannot be negative")]
    NegativeMemoryLimit,

    #[error("no inputs specified")]
    NoInputs,

    #[error("no ROI specified")]
    NoRoiSupplied,

    #[error("conflicting ROI options: {0}")]
    ConflictingRoiOptions(String),

    #[error("{what} has the wrong number of elements for {structure}: expected {expected}, got {actual}")]
    RoiSizeMismatch {
        what: &'static str,
        structure: Structure,
        expected: usize,
        actual: usize,
    },

    #[error("cannot use ROIs on this matrix, {axis} are not brain models")]
    NotBrainModels { axis: &'static str },

    #[error("mapping mismatch: {0}")]
    MappingMismatch(String),

    #[error("number of weights doesn't match length of a row: expected {expected}, got {actual}")]
    WeightCountMismatch { expected: usize, actual: usize },

    #[error("weights cannot be negative (weight {index} is {value})")]
    NegativeWeight { index: usize, value: f32 },

    #[error("cannot apply fisher z transformation to covariance")]
    FisherZWithCovariance,

    #[error("volume space mismatch: {0}")]
    VolumeSpaceMismatch(String),

    #[error("row length mismatch: expected {expected}, got {actual}")]
    RowLengthMismatch { expected: usize, actual: usize },

    #[error("map count mismatch: {0}")]
    MapCountMismatch(String),

    // Structural errors, raised while building or walking a mapping.
    #[error("structure {0} cannot be repeated on one axis")]
    DuplicateStructure(Structure),

    #[error("you must set the volume space before adding volume models")]
    NoVolumeSpace,

    #[error("voxel ({i}, {j}, {k}) is outside the volume space")]
    VoxelOutOfRange { i: i64, j: i64, k: i64 },

    #[error("voxel ({i}, {j}, {k}) is used more than once")]
    VoxelReused { i: i64, j: i64, k: i64 },

    #[error("invalid node list for {structure}: {message}")]
    InvalidNodeList { structure: Structure, message: String },

    #[error("model for {0} must contain at least one element")]
    EmptyModel(Structure),

    #[error("unsupported structure: {0}")]
    UnsupportedStructure(String),

    #[error("structure {0} not found in mapping")]
    StructureNotFound(Structure),

    #[error("selection contains no brainordinates")]
    EmptySelection,

    #[error("index {index} is out of range for an axis of length {length}")]
    InvalidIndex { index: usize, length: usize },

    #[error("wrong mapping type: expected {expected}, found {found}")]
    WrongMappingType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid parcel: {0}")]
    InvalidParcel(String),

    // I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NIfTI error: {0}")]
    Nifti(String),
}

impl From<nifti::NiftiError> for CiftiError {
    fn from(err: nifti::NiftiError) -> Self {
        CiftiError::Nifti(err.to_string())
    }
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, CiftiError>;
