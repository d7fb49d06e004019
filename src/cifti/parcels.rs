//! Parcels axis: each index is a named set of vertices and voxels.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::cifti::{Structure, VolumeSpace};
use crate::error::{CiftiError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub name: String,
    #[serde(default)]
    pub surface_nodes: BTreeMap<Structure, Vec<usize>>,
    #[serde(default)]
    pub voxels: Vec<[i64; 3]>,
}

impl Parcel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            surface_nodes: BTreeMap::new(),
            voxels: Vec::new(),
        }
    }

    pub fn with_nodes(mut self, structure: Structure, nodes: Vec<usize>) -> Self {
        self.surface_nodes.insert(structure, nodes);
        self
    }

    pub fn with_voxels(mut self, voxels: Vec<[i64; 3]>) -> Self {
        self.voxels = voxels;
        self
    }
}

/// Parcels with node/voxel to parcel lookups. No vertex or voxel may belong to
/// two parcels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "ParcelsRepr", into = "ParcelsRepr")]
pub struct ParcelsMap {
    surfaces: Vec<(Structure, usize)>,
    volume_space: Option<VolumeSpace>,
    parcels: Vec<Parcel>,
    node_lookup: HashMap<Structure, Vec<Option<usize>>>,
    voxel_lookup: HashMap<[i64; 3], usize>,
}

impl PartialEq for ParcelsMap {
    fn eq(&self, other: &Self) -> bool {
        self.surfaces == other.surfaces
            && self.volume_space == other.volume_space
            && self.parcels == other.parcels
    }
}

impl ParcelsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a surface that parcels may draw vertices from.
    pub fn with_surface(mut self, structure: Structure, num_nodes: usize) -> Result<Self> {
        if self.node_lookup.contains_key(&structure) {
            return Err(CiftiError::DuplicateStructure(structure));
        }
        if num_nodes == 0 {
            return Err(CiftiError::EmptyModel(structure));
        }
        self.surfaces.push((structure, num_nodes));
        self.node_lookup.insert(structure, vec![None; num_nodes]);
        Ok(self)
    }

    pub fn with_volume_space(mut self, space: VolumeSpace) -> Result<Self> {
        if let Some(&[i, j, k]) = self.voxel_lookup.keys().find(|v| !space.index_valid(v[0], v[1], v[2])) {
            return Err(CiftiError::VoxelOutOfRange { i, j, k });
        }
        self.volume_space = Some(space);
        Ok(self)
    }

    pub fn with_parcel(mut self, parcel: Parcel) -> Result<Self> {
        let index = self.parcels.len();
        if self.parcels.iter().any(|p| p.name == parcel.name) {
            return Err(CiftiError::InvalidParcel(format!("parcel name '{}' is repeated", parcel.name)));
        }
        for (&structure, nodes) in &parcel.surface_nodes {
            let lookup = self
                .node_lookup
                .get(&structure)
                .ok_or(CiftiError::StructureNotFound(structure))?;
            let mut seen = vec![false; lookup.len()];
            for &node in nodes {
                if node >= lookup.len() {
                    return Err(CiftiError::InvalidNodeList {
                        structure,
                        message: format!("vertex {} does not exist in a surface of {} vertices", node, lookup.len()),
                    });
                }
                if lookup[node].is_some() || seen[node] {
                    return Err(CiftiError::InvalidParcel(format!(
                        "vertex {} of {} is used by more than one parcel",
                        node, structure
                    )));
                }
                seen[node] = true;
            }
        }
        if !parcel.voxels.is_empty() {
            let space = self.volume_space.as_ref().ok_or(CiftiError::NoVolumeSpace)?;
            let mut seen = std::collections::HashSet::new();
            for &[i, j, k] in &parcel.voxels {
                if !space.index_valid(i, j, k) {
                    return Err(CiftiError::VoxelOutOfRange { i, j, k });
                }
                if self.voxel_lookup.contains_key(&[i, j, k]) || !seen.insert([i, j, k]) {
                    return Err(CiftiError::VoxelReused { i, j, k });
                }
            }
        }

        for (structure, nodes) in &parcel.surface_nodes {
            if let Some(lookup) = self.node_lookup.get_mut(structure) {
                for &node in nodes {
                    lookup[node] = Some(index);
                }
            }
        }
        for &ijk in &parcel.voxels {
            self.voxel_lookup.insert(ijk, index);
        }
        self.parcels.push(parcel);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    pub fn parcels(&self) -> &[Parcel] {
        &self.parcels
    }

    pub fn surfaces(&self) -> &[(Structure, usize)] {
        &self.surfaces
    }

    pub fn volume_space(&self) -> Option<&VolumeSpace> {
        self.volume_space.as_ref()
    }

    pub fn surface_node_count(&self, structure: Structure) -> Option<usize> {
        self.surfaces.iter().find(|(s, _)| *s == structure).map(|&(_, n)| n)
    }

    pub fn index_for_node(&self, structure: Structure, node: usize) -> Option<usize> {
        self.node_lookup.get(&structure)?.get(node).copied().flatten()
    }

    pub fn index_for_voxel(&self, i: i64, j: i64, k: i64) -> Option<usize> {
        self.voxel_lookup.get(&[i, j, k]).copied()
    }

    pub fn matches(&self, other: &ParcelsMap) -> bool {
        if self.surfaces != other.surfaces || self.parcels != other.parcels {
            return false;
        }
        match (&self.volume_space, &other.volume_space) {
            (Some(a), Some(b)) => a.matches(b),
            (None, None) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParcelsRepr {
    surfaces: Vec<(Structure, usize)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume_space: Option<VolumeSpace>,
    parcels: Vec<Parcel>,
}

impl From<ParcelsMap> for ParcelsRepr {
    fn from(map: ParcelsMap) -> Self {
        Self {
            surfaces: map.surfaces,
            volume_space: map.volume_space,
            parcels: map.parcels,
        }
    }
}

impl TryFrom<ParcelsRepr> for ParcelsMap {
    type Error = CiftiError;

    fn try_from(repr: ParcelsRepr) -> Result<Self> {
        let mut map = ParcelsMap::new();
        for (structure, num_nodes) in repr.surfaces {
            map = map.with_surface(structure, num_nodes)?;
        }
        if let Some(space) = repr.volume_space {
            map = map.with_volume_space(space)?;
        }
        for parcel in repr.parcels {
            map = map.with_parcel(parcel)?;
        }
        Ok(map)
    }
}
