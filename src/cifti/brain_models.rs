//! Brain-models axis: surface vertices and voxels laid out as contiguous models
//!
//! A `BrainModelsMap` decomposes a linear axis `[0, N)` into an ordered list of
//! models. Each model owns a contiguous range of indices starting at the end of
//! the furthest existing range, so ranges never overlap and never leave gaps.
//!
//! Maps are built with consuming `with_*` methods that validate the new model
//! before accepting it; the reverse lookup tables are rebuilt as part of every
//! successful append, so a finished map never needs lazy re-derivation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cifti::{Structure, VolumeSpace};
use crate::error::{CiftiError, Result};

// ============================================================================
// Models
// ============================================================================

/// Vertices of one surface structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceModel {
    pub structure: Structure,
    /// Vertex count of the full surface, even when only a subset is mapped.
    pub num_nodes: usize,
    pub offset: usize,
    /// Explicit vertex list; `None` maps every vertex in order.
    pub nodes: Option<Vec<usize>>,
}

impl SurfaceModel {
    pub fn count(&self) -> usize {
        match &self.nodes {
            Some(nodes) => nodes.len(),
            None => self.num_nodes,
        }
    }

    /// Vertex stored at position `pos` within this model.
    pub fn node_at(&self, pos: usize) -> usize {
        match &self.nodes {
            Some(nodes) => nodes[pos],
            None => pos,
        }
    }
}

/// Voxels of one volume structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelModel {
    pub structure: Structure,
    pub offset: usize,
    pub voxels: Vec<[i64; 3]>,
}

impl VoxelModel {
    pub fn count(&self) -> usize {
        self.voxels.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum BrainModel {
    Surface(SurfaceModel),
    Voxels(VoxelModel),
}

impl BrainModel {
    pub fn structure(&self) -> Structure {
        match self {
            BrainModel::Surface(m) => m.structure,
            BrainModel::Voxels(m) => m.structure,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            BrainModel::Surface(m) => m.offset,
            BrainModel::Voxels(m) => m.offset,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            BrainModel::Surface(m) => m.count(),
            BrainModel::Voxels(m) => m.count(),
        }
    }

    pub fn end(&self) -> usize {
        self.offset() + self.count()
    }

    pub fn is_surface(&self) -> bool {
        matches!(self, BrainModel::Surface(_))
    }
}

/// What a linear index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexInfo {
    Surface { structure: Structure, node: usize },
    Voxel { structure: Structure, ijk: [i64; 3] },
}

/// One entry of a per-structure surface map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceMapEntry {
    pub index: usize,
    pub node: usize,
}

/// One entry of a volume map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelMapEntry {
    pub index: usize,
    pub ijk: [i64; 3],
}

// ============================================================================
// BrainModelsMap
// ============================================================================

#[derive(Debug, Clone, Default)]
struct SurfaceLookup {
    model: usize,
    node_to_index: Vec<Option<usize>>,
}

/// Ordered brain models for one matrix axis, with O(1) reverse lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "BrainModelsRepr", into = "BrainModelsRepr")]
pub struct BrainModelsMap {
    models: Vec<BrainModel>,
    volume_space: Option<VolumeSpace>,
    surface_lookup: HashMap<Structure, SurfaceLookup>,
    voxel_lookup: HashMap<[i64; 3], usize>,
    length: usize,
}

impl PartialEq for BrainModelsMap {
    fn eq(&self, other: &Self) -> bool {
        self.models == other.models && self.volume_space == other.volume_space
    }
}

impl BrainModelsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the voxel grid. Existing voxel models must remain valid in it.
    pub fn with_volume_space(mut self, space: VolumeSpace) -> Result<Self> {
        for model in &self.models {
            if let BrainModel::Voxels(vm) = model {
                if let Some(&[i, j, k]) = vm.voxels.iter().find(|v| !space.index_valid(v[0], v[1], v[2])) {
                    return Err(CiftiError::VoxelOutOfRange { i, j, k });
                }
            }
        }
        self.volume_space = Some(space);
        Ok(self)
    }

    /// Append a surface model. `nodes` of `None` maps every vertex in order.
    pub fn with_surface_model(
        mut self,
        structure: Structure,
        num_nodes: usize,
        nodes: Option<&[usize]>,
    ) -> Result<Self> {
        if self.surface_lookup.contains_key(&structure) {
            return Err(CiftiError::DuplicateStructure(structure));
        }
        if num_nodes == 0 {
            return Err(CiftiError::EmptyModel(structure));
        }
        let offset = self.next_offset();
        let mut node_to_index = vec![None; num_nodes];
        let stored = match nodes {
            None => {
                for (pos, slot) in node_to_index.iter_mut().enumerate() {
                    *slot = Some(offset + pos);
                }
                None
            }
            Some(list) => {
                if list.is_empty() {
                    return Err(CiftiError::EmptyModel(structure));
                }
                for (pos, &node) in list.iter().enumerate() {
                    if node >= num_nodes {
                        return Err(CiftiError::InvalidNodeList {
                            structure,
                            message: format!("vertex {} does not exist in a surface of {} vertices", node, num_nodes),
                        });
                    }
                    if node_to_index[node].is_some() {
                        return Err(CiftiError::InvalidNodeList {
                            structure,
                            message: format!("vertex {} is used more than once", node),
                        });
                    }
                    node_to_index[node] = Some(offset + pos);
                }
                let sequential = list.len() == num_nodes && list.iter().enumerate().all(|(p, &n)| p == n);
                if sequential {
                    None
                } else {
                    Some(list.to_vec())
                }
            }
        };
        let model = SurfaceModel {
            structure,
            num_nodes,
            offset,
            nodes: stored,
        };
        self.length = self.length.max(offset + model.count());
        self.surface_lookup.insert(
            structure,
            SurfaceLookup {
                model: self.models.len(),
                node_to_index,
            },
        );
        self.models.push(BrainModel::Surface(model));
        Ok(self)
    }

    /// Append a surface model containing the vertices where `roi > 0`.
    pub fn with_surface_model_from_roi(self, structure: Structure, roi: &[f32]) -> Result<Self> {
        let nodes: Vec<usize> = roi
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > 0.0)
            .map(|(i, _)| i)
            .collect();
        self.with_surface_model(structure, roi.len(), Some(&nodes))
    }

    /// Append a voxel model. The volume space must already be set.
    pub fn with_voxel_model(mut self, structure: Structure, voxels: &[[i64; 3]]) -> Result<Self> {
        if self.volume_structures().contains(&structure) {
            return Err(CiftiError::DuplicateStructure(structure));
        }
        if voxels.is_empty() {
            return Err(CiftiError::EmptyModel(structure));
        }
        let space = self.volume_space.as_ref().ok_or(CiftiError::NoVolumeSpace)?;
        let offset = self.next_offset();
        let mut added: HashMap<[i64; 3], usize> = HashMap::with_capacity(voxels.len());
        for (pos, &ijk) in voxels.iter().enumerate() {
            let [i, j, k] = ijk;
            if !space.index_valid(i, j, k) {
                return Err(CiftiError::VoxelOutOfRange { i, j, k });
            }
            if self.voxel_lookup.contains_key(&ijk) || added.insert(ijk, offset + pos).is_some() {
                return Err(CiftiError::VoxelReused { i, j, k });
            }
        }
        self.voxel_lookup.extend(added);
        self.length = self.length.max(offset + voxels.len());
        self.models.push(BrainModel::Voxels(VoxelModel {
            structure,
            offset,
            voxels: voxels.to_vec(),
        }));
        Ok(self)
    }

    fn next_offset(&self) -> usize {
        self.models.iter().map(BrainModel::end).max().unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Models in creation order.
    pub fn models(&self) -> &[BrainModel] {
        &self.models
    }

    pub fn volume_space(&self) -> Option<&VolumeSpace> {
        self.volume_space.as_ref()
    }

    pub fn has_volume_data(&self) -> bool {
        self.models.iter().any(|m| !m.is_surface())
    }

    pub fn index_for_node(&self, structure: Structure, node: usize) -> Option<usize> {
        self.surface_lookup
            .get(&structure)
            .and_then(|l| l.node_to_index.get(node).copied().flatten())
    }

    pub fn index_for_voxel(&self, i: i64, j: i64, k: i64) -> Option<usize> {
        self.voxel_lookup.get(&[i, j, k]).copied()
    }

    /// Full vertex count of the surface behind `structure`.
    pub fn surface_node_count(&self, structure: Structure) -> Option<usize> {
        let lookup = self.surface_lookup.get(&structure)?;
        match &self.models[lookup.model] {
            BrainModel::Surface(m) => Some(m.num_nodes),
            BrainModel::Voxels(_) => None,
        }
    }

    /// Reverse lookup by bisection over model ranges.
    pub fn info_for_index(&self, index: usize) -> Result<IndexInfo> {
        if index >= self.length {
            return Err(CiftiError::InvalidIndex {
                index,
                length: self.length,
            });
        }
        let mut sorted: Vec<&BrainModel> = self.models.iter().collect();
        sorted.sort_by_key(|m| m.offset());
        let pos = sorted.partition_point(|m| m.offset() <= index);
        // Coverage guarantees a model starting at or before `index`.
        let model = sorted[pos - 1];
        let within = index - model.offset();
        Ok(match model {
            BrainModel::Surface(m) => IndexInfo::Surface {
                structure: m.structure,
                node: m.node_at(within),
            },
            BrainModel::Voxels(m) => IndexInfo::Voxel {
                structure: m.structure,
                ijk: m.voxels[within],
            },
        })
    }

    /// Surface and volume structures, each in model order.
    pub fn structure_lists(&self) -> (Vec<Structure>, Vec<Structure>) {
        (self.surface_structures(), self.volume_structures())
    }

    pub fn surface_structures(&self) -> Vec<Structure> {
        self.models
            .iter()
            .filter(|m| m.is_surface())
            .map(BrainModel::structure)
            .collect()
    }

    pub fn volume_structures(&self) -> Vec<Structure> {
        self.models
            .iter()
            .filter(|m| !m.is_surface())
            .map(BrainModel::structure)
            .collect()
    }

    pub fn surface_model(&self, structure: Structure) -> Option<&SurfaceModel> {
        let lookup = self.surface_lookup.get(&structure)?;
        match &self.models[lookup.model] {
            BrainModel::Surface(m) => Some(m),
            BrainModel::Voxels(_) => None,
        }
    }

    pub fn surface_map(&self, structure: Structure) -> Result<Vec<SurfaceMapEntry>> {
        let model = self
            .surface_model(structure)
            .ok_or(CiftiError::StructureNotFound(structure))?;
        Ok((0..model.count())
            .map(|pos| SurfaceMapEntry {
                index: model.offset + pos,
                node: model.node_at(pos),
            })
            .collect())
    }

    /// All voxels of all volume models, in model order.
    pub fn volume_map(&self) -> Vec<VoxelMapEntry> {
        self.models
            .iter()
            .filter_map(|m| match m {
                BrainModel::Voxels(vm) => Some(vm),
                BrainModel::Surface(_) => None,
            })
            .flat_map(|vm| {
                vm.voxels.iter().enumerate().map(move |(pos, &ijk)| VoxelMapEntry {
                    index: vm.offset + pos,
                    ijk,
                })
            })
            .collect()
    }

    pub fn volume_structure_map(&self, structure: Structure) -> Result<Vec<VoxelMapEntry>> {
        let vm = self
            .models
            .iter()
            .find_map(|m| match m {
                BrainModel::Voxels(vm) if vm.structure == structure => Some(vm),
                _ => None,
            })
            .ok_or(CiftiError::StructureNotFound(structure))?;
        Ok(vm
            .voxels
            .iter()
            .enumerate()
            .map(|(pos, &ijk)| VoxelMapEntry {
                index: vm.offset + pos,
                ijk,
            })
            .collect())
    }

    /// Structural equality, with volume spaces compared within tolerance.
    pub fn matches(&self, other: &BrainModelsMap) -> bool {
        if self.models != other.models {
            return false;
        }
        if self.has_volume_data() || other.has_volume_data() {
            match (&self.volume_space, &other.volume_space) {
                (Some(a), Some(b)) => a.matches(b),
                _ => false,
            }
        } else {
            true
        }
    }
}

// ============================================================================
// Serialization
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
enum ModelRepr {
    Surface {
        structure: Structure,
        num_nodes: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nodes: Option<Vec<usize>>,
    },
    Voxels {
        structure: Structure,
        voxels: Vec<[i64; 3]>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BrainModelsRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume_space: Option<VolumeSpace>,
    models: Vec<ModelRepr>,
}

impl From<BrainModelsMap> for BrainModelsRepr {
    fn from(map: BrainModelsMap) -> Self {
        let models = map
            .models
            .into_iter()
            .map(|m| match m {
                BrainModel::Surface(s) => ModelRepr::Surface {
                    structure: s.structure,
                    num_nodes: s.num_nodes,
                    nodes: s.nodes,
                },
                BrainModel::Voxels(v) => ModelRepr::Voxels {
                    structure: v.structure,
                    voxels: v.voxels,
                },
            })
            .collect();
        Self {
            volume_space: map.volume_space,
            models,
        }
    }
}

impl TryFrom<BrainModelsRepr> for BrainModelsMap {
    type Error = CiftiError;

    fn try_from(repr: BrainModelsRepr) -> Result<Self> {
        let mut map = BrainModelsMap::new();
        if let Some(space) = repr.volume_space {
            map = map.with_volume_space(space)?;
        }
        for model in repr.models {
            map = match model {
                ModelRepr::Surface {
                    structure,
                    num_nodes,
                    nodes,
                } => map.with_surface_model(structure, num_nodes, nodes.as_deref())?,
                ModelRepr::Voxels { structure, voxels } => map.with_voxel_model(structure, &voxels)?,
            };
        }
        Ok(map)
    }
}
