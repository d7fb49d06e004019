//! Brainordinate mappings for matrix axes
//!
//! This module provides:
//! - Structure identifiers
//! - Volume space (voxel grid plus sform) with tolerant matching
//! - Brain-models maps (surface and voxel models with reverse lookups)
//! - Parcels, scalar, label, and series maps
//! - The two-axis `CiftiXml` header

pub mod structure;
pub mod volume_space;
pub mod brain_models;
pub mod parcels;
pub mod named_maps;
pub mod mapping;

pub use structure::*;
pub use volume_space::*;
pub use brain_models::*;
pub use parcels::*;
pub use named_maps::*;
pub use mapping::*;
