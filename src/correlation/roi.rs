//! ROI masks and the ROI-to-linear-index remapper
//!
//! Surface ROIs are per-vertex value arrays over a full surface, volume ROIs are
//! voxel arrays over a volume space. A vertex or voxel is selected when its
//! value is positive. `remap` walks the source mapping in model order and
//! produces both the `(source row, output row)` pairs and the brain-models
//! mapping of the selected rows, with output offsets that match the pair
//! order one to one.

use crate::cifti::{BrainModelsMap, IndexMap, Structure, VolumeSpace};
use crate::error::{CiftiError, Result};
use crate::matrix::RowMatrix;

// ============================================================================
// ROI inputs
// ============================================================================

/// Per-vertex ROI values for one surface, possibly with several maps.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRoi {
    num_nodes: usize,
    maps: Vec<Vec<f32>>,
    names: Vec<String>,
}

impl SurfaceRoi {
    /// Single-map ROI.
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            num_nodes: values.len(),
            maps: vec![values],
            names: vec![String::new()],
        }
    }

    /// Multi-map ROI; every map must cover the same vertices.
    pub fn with_maps(maps: Vec<Vec<f32>>, names: Vec<String>) -> Result<Self> {
        let num_nodes = maps.first().map_or(0, Vec::len);
        if let Some(bad) = maps.iter().find(|m| m.len() != num_nodes) {
            return Err(CiftiError::RowLengthMismatch {
                expected: num_nodes,
                actual: bad.len(),
            });
        }
        if names.len() != maps.len() {
            return Err(CiftiError::MapCountMismatch(format!(
                "{} map names given for {} maps",
                names.len(),
                maps.len()
            )));
        }
        Ok(Self { num_nodes, maps, names })
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_maps(&self) -> usize {
        self.maps.len()
    }

    pub fn map_names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self, map: usize) -> &[f32] {
        &self.maps[map]
    }

    pub fn value(&self, map: usize, node: usize) -> f32 {
        self.maps[map].get(node).copied().unwrap_or(0.0)
    }
}

/// Voxel ROI values in a volume space, possibly with several maps.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRoi {
    space: VolumeSpace,
    maps: Vec<Vec<f32>>,
    names: Vec<String>,
}

impl VolumeRoi {
    /// Single-frame ROI. `values` is in Fortran order (i fastest).
    pub fn new(space: VolumeSpace, values: Vec<f32>) -> Result<Self> {
        Self::with_maps(space, vec![values], vec![String::new()])
    }

    pub fn with_maps(space: VolumeSpace, maps: Vec<Vec<f32>>, names: Vec<String>) -> Result<Self> {
        let expected = space.num_voxels();
        if let Some(bad) = maps.iter().find(|m| m.len() != expected) {
            return Err(CiftiError::RowLengthMismatch {
                expected,
                actual: bad.len(),
            });
        }
        if names.len() != maps.len() {
            return Err(CiftiError::MapCountMismatch(format!(
                "{} map names given for {} volume frames",
                names.len(),
                maps.len()
            )));
        }
        Ok(Self { space, maps, names })
    }

    pub fn space(&self) -> &VolumeSpace {
        &self.space
    }

    pub fn num_maps(&self) -> usize {
        self.maps.len()
    }

    pub fn map_names(&self) -> &[String] {
        &self.names
    }

    /// Value at a voxel; 0 outside the volume.
    pub fn value(&self, map: usize, ijk: [i64; 3]) -> f32 {
        self.space
            .linear_offset(ijk[0], ijk[1], ijk[2])
            .map_or(0.0, |off| self.maps[map][off])
    }
}

/// The ROI options of one run. Only cortex left, cortex right, and cerebellum
/// surfaces can carry a surface ROI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoiMasks {
    pub left: Option<SurfaceRoi>,
    pub right: Option<SurfaceRoi>,
    pub cerebellum: Option<SurfaceRoi>,
    pub volume: Option<VolumeRoi>,
}

impl RoiMasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_left(mut self, roi: SurfaceRoi) -> Self {
        self.left = Some(roi);
        self
    }

    pub fn with_right(mut self, roi: SurfaceRoi) -> Self {
        self.right = Some(roi);
        self
    }

    pub fn with_cerebellum(mut self, roi: SurfaceRoi) -> Self {
        self.cerebellum = Some(roi);
        self
    }

    pub fn with_volume(mut self, roi: VolumeRoi) -> Self {
        self.volume = Some(roi);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none() && self.cerebellum.is_none() && self.volume.is_none()
    }

    pub fn surface_for(&self, structure: Structure) -> Option<&SurfaceRoi> {
        match structure {
            Structure::CortexLeft => self.left.as_ref(),
            Structure::CortexRight => self.right.as_ref(),
            Structure::Cerebellum => self.cerebellum.as_ref(),
            _ => None,
        }
    }

    /// Supplied surface ROIs with their structures.
    pub fn surfaces(&self) -> impl Iterator<Item = (Structure, &SurfaceRoi)> {
        [
            (Structure::CortexLeft, self.left.as_ref()),
            (Structure::CortexRight, self.right.as_ref()),
            (Structure::Cerebellum, self.cerebellum.as_ref()),
        ]
        .into_iter()
        .filter_map(|(s, roi)| roi.map(|r| (s, r)))
    }

    /// Number of maps shared by every supplied ROI.
    pub fn num_maps(&self) -> Result<usize> {
        let mut counts = self
            .surfaces()
            .map(|(s, roi)| (s.name().to_string(), roi.num_maps()))
            .chain(self.volume.iter().map(|v| ("volume".to_string(), v.num_maps())));
        let (first_name, first) = counts.next().ok_or(CiftiError::NoRoiSupplied)?;
        for (name, count) in counts {
            if count != first {
                return Err(CiftiError::MapCountMismatch(format!(
                    "{} roi has {} maps, {} roi has {}",
                    name, count, first_name, first
                )));
            }
        }
        Ok(first)
    }

    /// Map names of the first supplied ROI.
    pub fn map_names(&self) -> Vec<String> {
        self.surfaces()
            .map(|(_, roi)| roi.map_names().to_vec())
            .next()
            .or_else(|| self.volume.as_ref().map(|v| v.map_names().to_vec()))
            .unwrap_or_default()
    }

    /// Split a dense ROI matrix (rows are brain models, each column a map)
    /// into per-structure masks.
    pub fn from_dense(roi: &dyn RowMatrix) -> Result<Self> {
        let xml = roi.cifti_xml();
        let models = match &xml.rows {
            IndexMap::BrainModels(m) => m,
            _ => return Err(CiftiError::NotBrainModels { axis: "roi rows" }),
        };
        let num_maps = roi.num_cols();
        let names: Vec<String> = match &xml.columns {
            IndexMap::Scalars(s) => s.maps.iter().map(|m| m.name.clone()).collect(),
            IndexMap::Labels(l) => l.maps.iter().map(|m| m.name.clone()).collect(),
            _ => vec![String::new(); num_maps],
        };
        let mut scratch = vec![0.0f32; num_maps];
        let mut masks = RoiMasks::new();

        for structure in models.surface_structures() {
            if !matches!(structure, Structure::CortexLeft | Structure::CortexRight | Structure::Cerebellum) {
                return Err(CiftiError::UnsupportedStructure(format!(
                    "structure not supported for surface type: {}",
                    structure
                )));
            }
            let num_nodes = models
                .surface_node_count(structure)
                .ok_or(CiftiError::StructureNotFound(structure))?;
            let mut maps = vec![vec![0.0f32; num_nodes]; num_maps];
            for entry in models.surface_map(structure)? {
                roi.read_row(entry.index, &mut scratch)?;
                for (map, &v) in maps.iter_mut().zip(&scratch) {
                    map[entry.node] = v;
                }
            }
            let surface = SurfaceRoi::with_maps(maps, names.clone())?;
            masks = match structure {
                Structure::CortexLeft => masks.with_left(surface),
                Structure::CortexRight => masks.with_right(surface),
                _ => masks.with_cerebellum(surface),
            };
        }

        if models.has_volume_data() {
            let space = models.volume_space().ok_or(CiftiError::NoVolumeSpace)?.clone();
            let mut maps = vec![vec![0.0f32; space.num_voxels()]; num_maps];
            for entry in models.volume_map() {
                let [i, j, k] = entry.ijk;
                let off = space
                    .linear_offset(i, j, k)
                    .ok_or(CiftiError::VoxelOutOfRange { i, j, k })?;
                roi.read_row(entry.index, &mut scratch)?;
                for (map, &v) in maps.iter_mut().zip(&scratch) {
                    map[off] = v;
                }
            }
            masks = masks.with_volume(VolumeRoi::with_maps(space, maps, names)?);
        }
        Ok(masks)
    }
}

// ============================================================================
// Remapping
// ============================================================================

/// One selected row: where it comes from and where it goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPair {
    pub source: usize,
    pub output: usize,
}

/// Selected rows in output order plus the mapping of the output rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiSelection {
    pub pairs: Vec<RowPair>,
    pub mapping: BrainModelsMap,
}

impl RoiSelection {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Select the rows of `source` inside `rois` (first map of each ROI).
///
/// Surfaces are visited in the mapping's model order, then voxels of each
/// volume structure. Output indices are assigned in visit order starting at 0.
pub fn remap(source: &BrainModelsMap, rois: &RoiMasks) -> Result<RoiSelection> {
    if rois.is_empty() {
        return Err(CiftiError::NoRoiSupplied);
    }
    let surfaces = source.surface_structures();
    for (structure, _) in rois.surfaces() {
        if !surfaces.contains(&structure) {
            return Err(CiftiError::StructureNotFound(structure));
        }
    }

    let mut mapping = BrainModelsMap::new();
    if let Some(space) = source.volume_space() {
        mapping = mapping.with_volume_space(space.clone())?;
    }
    let mut pairs = Vec::new();

    for structure in surfaces {
        let roi = match rois.surface_for(structure) {
            Some(roi) => roi,
            None => continue,
        };
        let num_nodes = source
            .surface_node_count(structure)
            .ok_or(CiftiError::StructureNotFound(structure))?;
        if roi.num_nodes() != num_nodes {
            return Err(CiftiError::RoiSizeMismatch {
                what: "surface roi",
                structure,
                expected: num_nodes,
                actual: roi.num_nodes(),
            });
        }
        let mut nodes = Vec::new();
        for entry in source.surface_map(structure)? {
            if roi.value(0, entry.node) > 0.0 {
                nodes.push(entry.node);
                pairs.push(RowPair {
                    source: entry.index,
                    output: pairs.len(),
                });
            }
        }
        if !nodes.is_empty() {
            mapping = mapping.with_surface_model(structure, num_nodes, Some(&nodes))?;
        }
    }

    if let Some(vol) = &rois.volume {
        let space = source
            .volume_space()
            .ok_or_else(|| CiftiError::VolumeSpaceMismatch("matrix has no volume space".to_string()))?;
        if !vol.space().matches(space) {
            return Err(CiftiError::VolumeSpaceMismatch(
                "roi volume space doesn't match matrix volume space".to_string(),
            ));
        }
        for structure in source.volume_structures() {
            let mut voxels = Vec::new();
            for entry in source.volume_structure_map(structure)? {
                if vol.value(0, entry.ijk) > 0.0 {
                    voxels.push(entry.ijk);
                    pairs.push(RowPair {
                        source: entry.index,
                        output: pairs.len(),
                    });
                }
            }
            if !voxels.is_empty() {
                mapping = mapping.with_voxel_model(structure, &voxels)?;
            }
        }
    }

    if pairs.is_empty() {
        return Err(CiftiError::EmptySelection);
    }
    Ok(RoiSelection { pairs, mapping })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cifti::{CiftiXml, ScalarsMap};
    use crate::matrix::InMemoryMatrix;

    fn source() -> BrainModelsMap {
        BrainModelsMap::new()
            .with_volume_space(VolumeSpace::with_dims([2, 2, 1]))
            .unwrap()
            .with_surface_model(Structure::CortexRight, 4, Some(&[3, 1, 0]))
            .unwrap()
            .with_voxel_model(Structure::ThalamusLeft, &[[0, 0, 0], [1, 0, 0]])
            .unwrap()
            .with_surface_model(Structure::CortexLeft, 3, None)
            .unwrap()
            .with_voxel_model(Structure::ThalamusRight, &[[0, 1, 0], [1, 1, 0]])
            .unwrap()
    }

    #[test]
    fn test_remap_follows_model_order() {
        let rois = RoiMasks::new()
            .with_left(SurfaceRoi::new(vec![1.0, 0.0, 1.0]))
            .with_right(SurfaceRoi::new(vec![1.0, 0.0, 0.0, 1.0]))
            .with_volume(VolumeRoi::new(VolumeSpace::with_dims([2, 2, 1]), vec![0.0, 1.0, 0.0, 1.0]).unwrap());
        let sel = remap(&source(), &rois).unwrap();

        // right surface first (model order): node 3 at row 0, node 0 at row 2
        let sources: Vec<usize> = sel.pairs.iter().map(|p| p.source).collect();
        assert_eq!(sources, vec![0, 2, 3, 4, 5, 6, 8]);
        let outputs: Vec<usize> = sel.pairs.iter().map(|p| p.output).collect();
        assert_eq!(outputs, (0..7).collect::<Vec<_>>());

        let m = &sel.mapping;
        assert_eq!(m.len(), 7);
        assert_eq!(m.surface_structures(), vec![Structure::CortexRight, Structure::CortexLeft]);
        assert_eq!(m.volume_structures(), vec![Structure::ThalamusLeft, Structure::ThalamusRight]);
        assert_eq!(m.index_for_node(Structure::CortexRight, 3), Some(0));
        assert_eq!(m.index_for_node(Structure::CortexRight, 0), Some(1));
        assert_eq!(m.index_for_node(Structure::CortexLeft, 2), Some(3));
        assert_eq!(m.index_for_voxel(1, 0, 0), Some(4));
        assert_eq!(m.index_for_voxel(1, 1, 0), Some(5));
        assert_eq!(m.surface_node_count(Structure::CortexRight), Some(4));
    }

    #[test]
    fn test_remap_output_offsets_match_pairs() {
        let rois = RoiMasks::new().with_left(SurfaceRoi::new(vec![0.0, 1.0, 1.0]));
        let sel = remap(&source(), &rois).unwrap();
        for pair in &sel.pairs {
            let entry = sel.mapping.surface_map(Structure::CortexLeft).unwrap()[pair.output];
            assert_eq!(entry.index, pair.output);
            assert_eq!(source().index_for_node(Structure::CortexLeft, entry.node), Some(pair.source));
        }
    }

    #[test]
    fn test_remap_empty_selection_fails() {
        let rois = RoiMasks::new().with_left(SurfaceRoi::new(vec![0.0, -1.0, 0.0]));
        assert!(matches!(remap(&source(), &rois), Err(CiftiError::EmptySelection)));
        assert!(matches!(remap(&source(), &RoiMasks::new()), Err(CiftiError::NoRoiSupplied)));
    }

    #[test]
    fn test_remap_size_mismatch() {
        let rois = RoiMasks::new().with_left(SurfaceRoi::new(vec![1.0; 5]));
        assert!(matches!(
            remap(&source(), &rois),
            Err(CiftiError::RoiSizeMismatch { expected: 3, actual: 5, .. })
        ));
    }

    #[test]
    fn test_remap_volume_space_mismatch() {
        let rois = RoiMasks::new().with_volume(VolumeRoi::new(VolumeSpace::with_dims([2, 2, 2]), vec![1.0; 8]).unwrap());
        assert!(matches!(remap(&source(), &rois), Err(CiftiError::VolumeSpaceMismatch(_))));
    }

    #[test]
    fn test_remap_missing_structure() {
        let rois = RoiMasks::new().with_cerebellum(SurfaceRoi::new(vec![1.0; 3]));
        assert!(matches!(
            remap(&source(), &rois),
            Err(CiftiError::StructureNotFound(Structure::Cerebellum))
        ));
    }

    #[test]
    fn test_masks_from_dense_roi() {
        let models = BrainModelsMap::new()
            .with_volume_space(VolumeSpace::with_dims([2, 1, 1]))
            .unwrap()
            .with_surface_model(Structure::CortexLeft, 4, Some(&[2, 0]))
            .unwrap()
            .with_voxel_model(Structure::BrainStem, &[[1, 0, 0]])
            .unwrap();
        let xml = CiftiXml::new(
            IndexMap::BrainModels(models),
            IndexMap::Scalars(ScalarsMap::from_names(["seed"])),
        );
        let roi = InMemoryMatrix::from_rows(xml, &[vec![1.0], vec![0.0], vec![2.0]]).unwrap();
        let masks = RoiMasks::from_dense(&roi).unwrap();
        let left = masks.left.as_ref().unwrap();
        assert_eq!(left.values(0), &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(left.map_names(), &["seed".to_string()]);
        assert!(masks.right.is_none());
        let vol = masks.volume.as_ref().unwrap();
        assert_eq!(vol.value(0, [1, 0, 0]), 2.0);
        assert_eq!(vol.value(0, [0, 0, 0]), 0.0);
    }

    #[test]
    fn test_masks_from_dense_rejects_other_surfaces() {
        let models = BrainModelsMap::new().with_surface_model(Structure::Cortex, 2, None).unwrap();
        let xml = CiftiXml::new(IndexMap::BrainModels(models), IndexMap::Scalars(ScalarsMap::with_count(1)));
        let roi = InMemoryMatrix::from_rows(xml, &[vec![1.0], vec![1.0]]).unwrap();
        assert!(matches!(RoiMasks::from_dense(&roi), Err(CiftiError::UnsupportedStructure(_))));
    }

    #[test]
    fn test_num_maps_must_agree() {
        let two = SurfaceRoi::with_maps(vec![vec![1.0], vec![0.0]], vec!["a".into(), "b".into()]).unwrap();
        let masks = RoiMasks::new().with_left(two).with_right(SurfaceRoi::new(vec![1.0]));
        assert!(matches!(masks.num_maps(), Err(CiftiError::MapCountMismatch(_))));
        assert!(matches!(RoiMasks::new().num_maps(), Err(CiftiError::NoRoiSupplied)));
    }
}
