//! Per-axis index maps and the two-axis header of a matrix.
//!
//! `CiftiXml` owns one `IndexMap` per axis as a plain value. Copying a row
//! mapping onto the column axis is an ordinary clone, and resetting an axis
//! replaces its map wholesale.

use serde::{Deserialize, Serialize};

use crate::cifti::{
    BrainModelsMap, LabelsMap, ParcelsMap, ScalarsMap, SeriesMap, Structure, SurfaceMapEntry, VoxelMapEntry,
};
use crate::error::{CiftiError, Result};

/// How one axis's linear indices map to brainordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "map", rename_all = "snake_case")]
pub enum IndexMap {
    BrainModels(BrainModelsMap),
    Parcels(ParcelsMap),
    Scalars(ScalarsMap),
    Labels(LabelsMap),
    Series(SeriesMap),
}

impl IndexMap {
    pub fn len(&self) -> usize {
        match self {
            IndexMap::BrainModels(m) => m.len(),
            IndexMap::Parcels(m) => m.len(),
            IndexMap::Scalars(m) => m.len(),
            IndexMap::Labels(m) => m.len(),
            IndexMap::Series(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            IndexMap::BrainModels(_) => "brain models",
            IndexMap::Parcels(_) => "parcels",
            IndexMap::Scalars(_) => "scalars",
            IndexMap::Labels(_) => "labels",
            IndexMap::Series(_) => "series",
        }
    }

    pub fn as_brain_models(&self) -> Result<&BrainModelsMap> {
        match self {
            IndexMap::BrainModels(m) => Ok(m),
            other => Err(CiftiError::WrongMappingType {
                expected: "brain models",
                found: other.kind_name(),
            }),
        }
    }

    /// Compatibility predicate: spatial maps compare volume spaces within
    /// tolerance, the rest compare exactly.
    pub fn matches(&self, other: &IndexMap) -> bool {
        match (self, other) {
            (IndexMap::BrainModels(a), IndexMap::BrainModels(b)) => a.matches(b),
            (IndexMap::Parcels(a), IndexMap::Parcels(b)) => a.matches(b),
            (a, b) => a == b,
        }
    }
}

/// Header of a two-dimensional matrix: one map per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiftiXml {
    pub rows: IndexMap,
    pub columns: IndexMap,
}

impl CiftiXml {
    pub fn new(rows: IndexMap, columns: IndexMap) -> Self {
        Self { rows, columns }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    /// Copy the row mapping onto the column axis.
    pub fn apply_row_map_to_columns(&mut self) {
        self.columns = self.rows.clone();
    }

    pub fn apply_column_map_to_rows(&mut self) {
        self.rows = self.columns.clone();
    }

    pub fn reset_rows_to_scalars(&mut self, count: usize) {
        self.rows = IndexMap::Scalars(ScalarsMap::with_count(count));
    }

    pub fn reset_columns_to_scalars(&mut self, count: usize) {
        self.columns = IndexMap::Scalars(ScalarsMap::with_count(count));
    }

    pub fn reset_rows_to_timepoints(&mut self, step: f32, count: usize, start: f32) {
        self.rows = IndexMap::Series(SeriesMap::timepoints(step, count, start));
    }

    pub fn reset_columns_to_timepoints(&mut self, step: f32, count: usize, start: f32) {
        self.columns = IndexMap::Series(SeriesMap::timepoints(step, count, start));
    }

    pub fn reset_rows_to_parcels(&mut self) {
        self.rows = IndexMap::Parcels(ParcelsMap::new());
    }

    pub fn reset_rows_to_brain_models(&mut self) {
        self.rows = IndexMap::BrainModels(BrainModelsMap::new());
    }

    pub fn reset_columns_to_brain_models(&mut self) {
        self.columns = IndexMap::BrainModels(BrainModelsMap::new());
    }

    pub fn matches_for_rows(&self, other: &CiftiXml) -> bool {
        self.rows.matches(&other.rows)
    }

    pub fn matches_for_columns(&self, other: &CiftiXml) -> bool {
        self.columns.matches(&other.columns)
    }

    pub fn structure_lists_for_rows(&self) -> Result<(Vec<Structure>, Vec<Structure>)> {
        Ok(self.rows.as_brain_models()?.structure_lists())
    }

    pub fn structure_lists_for_columns(&self) -> Result<(Vec<Structure>, Vec<Structure>)> {
        Ok(self.columns.as_brain_models()?.structure_lists())
    }

    pub fn surface_map_for_rows(&self, structure: Structure) -> Result<Vec<SurfaceMapEntry>> {
        self.rows.as_brain_models()?.surface_map(structure)
    }

    pub fn surface_map_for_columns(&self, structure: Structure) -> Result<Vec<SurfaceMapEntry>> {
        self.columns.as_brain_models()?.surface_map(structure)
    }

    pub fn volume_map_for_rows(&self) -> Result<Vec<VoxelMapEntry>> {
        Ok(self.rows.as_brain_models()?.volume_map())
    }

    pub fn volume_map_for_columns(&self) -> Result<Vec<VoxelMapEntry>> {
        Ok(self.columns.as_brain_models()?.volume_map())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cifti::VolumeSpace;

    fn dense() -> CiftiXml {
        let models = BrainModelsMap::new()
            .with_volume_space(VolumeSpace::with_dims([2, 2, 2]))
            .unwrap()
            .with_surface_model(Structure::CortexLeft, 3, None)
            .unwrap()
            .with_voxel_model(Structure::BrainStem, &[[0, 0, 0]])
            .unwrap();
        CiftiXml::new(IndexMap::BrainModels(models), IndexMap::Series(SeriesMap::timepoints(1.0, 7, 0.0)))
    }

    #[test]
    fn test_dimensions() {
        let xml = dense();
        assert_eq!(xml.num_rows(), 4);
        assert_eq!(xml.num_cols(), 7);
    }

    #[test]
    fn test_apply_row_map_to_columns() {
        let mut xml = dense();
        xml.apply_row_map_to_columns();
        assert_eq!(xml.num_cols(), 4);
        assert!(xml.columns.matches(&dense().rows));
        assert_eq!(xml.structure_lists_for_columns().unwrap().0, vec![Structure::CortexLeft]);
    }

    #[test]
    fn test_resets_replace_axis() {
        let mut xml = dense();
        xml.reset_rows_to_scalars(2);
        assert_eq!(xml.num_rows(), 2);
        assert!(matches!(
            xml.structure_lists_for_rows(),
            Err(CiftiError::WrongMappingType { found: "scalars", .. })
        ));
        xml.reset_columns_to_timepoints(2.0, 3, 0.5);
        assert_eq!(xml.num_cols(), 3);
        xml.reset_rows_to_parcels();
        assert_eq!(xml.num_rows(), 0);
    }

    #[test]
    fn test_json_round_trip() {
        let xml = dense();
        let json = serde_json::to_string(&xml).unwrap();
        let back: CiftiXml = serde_json::from_str(&json).unwrap();
        assert_eq!(back, xml);
        assert_eq!(back.volume_map_for_rows().unwrap()[0].index, 3);
    }
}
