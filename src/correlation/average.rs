//! Averaged ROI-seed correlation across inputs
//!
//! For each input and each ROI map, the rows inside the ROI are summed into
//! one seed row (surface ROI values act as weights, optionally multiplied by
//! per-vertex areas; volume voxels with a positive ROI value count once).
//! Every row of the input is then correlated with each demeaned seed,
//! Fisher-z transformed, and the results are averaged over all inputs.

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cifti::{BrainModelsMap, CiftiXml, IndexMap, ScalarsMap, Structure};
use crate::correlation::roi::RoiMasks;
use crate::correlation::row_cache::RowCache;
use crate::correlation::stats::{fisher_z, RowPrep};
use crate::error::{CiftiError, Result};
use crate::matrix::{CiftiSink, RowMatrix};
use crate::utils::simd_ops::{dot_product_f64, sum_sq_dev_f64};

/// Per-vertex surface areas, used to weight surface ROI values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexAreas {
    pub left: Option<Vec<f32>>,
    pub right: Option<Vec<f32>>,
    pub cerebellum: Option<Vec<f32>>,
}

impl VertexAreas {
    pub fn for_structure(&self, structure: Structure) -> Option<&[f32]> {
        match structure {
            Structure::CortexLeft => self.left.as_deref(),
            Structure::CortexRight => self.right.as_deref(),
            Structure::Cerebellum => self.cerebellum.as_deref(),
            _ => None,
        }
    }
}

struct Seed {
    row: Vec<f32>,
    rrs: f64,
}

/// Average over `inputs` of the Fisher-z correlation between every row and
/// each ROI map's seed row.
///
/// The output keeps the inputs' row mapping; its columns are one scalar map
/// per ROI map, named after the ROI maps.
pub fn average_roi_correlation(
    inputs: &[&dyn RowMatrix],
    rois: &RoiMasks,
    areas: &VertexAreas,
    out: &mut dyn CiftiSink,
) -> Result<CiftiXml> {
    let first = inputs.first().ok_or(CiftiError::NoInputs)?;
    let num_maps = rois.num_maps()?;
    for (structure, roi) in rois.surfaces() {
        if let Some(area) = areas.for_structure(structure) {
            if area.len() != roi.num_nodes() {
                return Err(CiftiError::RoiSizeMismatch {
                    what: "vertex areas",
                    structure,
                    expected: roi.num_nodes(),
                    actual: area.len(),
                });
            }
        }
    }

    let base = first.cifti_xml();
    let models = match &base.rows {
        IndexMap::BrainModels(models) => models,
        _ => return Err(CiftiError::NotBrainModels { axis: "rows" }),
    };
    for (n, input) in inputs.iter().enumerate().skip(1) {
        if !input.cifti_xml().rows.matches(&base.rows) {
            return Err(CiftiError::MappingMismatch(format!(
                "cifti space does not match between input #1 and #{}",
                n + 1
            )));
        }
        if input.num_cols() != first.num_cols() {
            return Err(CiftiError::RowLengthMismatch {
                expected: first.num_cols(),
                actual: input.num_cols(),
            });
        }
    }
    check_rois(models, rois)?;

    let mut xml = base.clone();
    xml.columns = IndexMap::Scalars(ScalarsMap::from_names(rois.map_names()));
    out.set_cifti_xml(xml.clone())?;

    let num_rows = first.num_rows();
    let mut accum = vec![vec![0.0f64; num_maps]; num_rows];
    for (n, input) in inputs.iter().enumerate() {
        info!("correlating input #{} of {}", n + 1, inputs.len());
        let result = process_input(*input, models, rois, areas, num_maps)?;
        for (acc, row) in accum.iter_mut().zip(&result) {
            for (a, &v) in acc.iter_mut().zip(row) {
                *a += v as f64;
            }
        }
    }

    let count = inputs.len() as f64;
    let mut row = vec![0.0f32; num_maps];
    for (i, acc) in accum.iter().enumerate() {
        for (dst, &v) in row.iter_mut().zip(acc) {
            *dst = (v / count) as f32;
        }
        out.set_row(i, &row)?;
    }
    Ok(xml)
}

fn check_rois(models: &BrainModelsMap, rois: &RoiMasks) -> Result<()> {
    for (structure, roi) in rois.surfaces() {
        match models.surface_node_count(structure) {
            None => warn!("input is missing structure {}", structure),
            Some(count) if count != roi.num_nodes() => {
                return Err(CiftiError::RoiSizeMismatch {
                    what: "surface roi",
                    structure,
                    expected: count,
                    actual: roi.num_nodes(),
                });
            }
            Some(_) => {}
        }
    }
    if let Some(vol) = &rois.volume {
        let matches = models.volume_space().is_some_and(|space| vol.space().matches(space));
        if !matches {
            return Err(CiftiError::VolumeSpaceMismatch(
                "input doesn't match the roi volume's space".to_string(),
            ));
        }
    }
    Ok(())
}

/// Weighted sum of the ROI rows for every map, demeaned.
fn build_seeds(
    input: &dyn RowMatrix,
    models: &BrainModelsMap,
    rois: &RoiMasks,
    areas: &VertexAreas,
    num_maps: usize,
) -> Result<Vec<Seed>> {
    let num_cols = input.num_cols();
    let mut accum = vec![vec![0.0f64; num_cols]; num_maps];
    let mut scratch = vec![0.0f32; num_cols];
    let mut weights = vec![0.0f64; num_maps];

    for (structure, roi) in rois.surfaces() {
        if models.surface_node_count(structure).is_none() {
            continue;
        }
        let area = areas.for_structure(structure);
        for entry in models.surface_map(structure)? {
            for (map, w) in weights.iter_mut().enumerate() {
                let value = roi.value(map, entry.node) as f64;
                *w = match area {
                    Some(a) if value != 0.0 => value * a[entry.node] as f64,
                    _ => value,
                };
            }
            add_row(input, entry.index, &weights, &mut scratch, &mut accum)?;
        }
    }
    if let Some(vol) = &rois.volume {
        for entry in models.volume_map() {
            for (map, w) in weights.iter_mut().enumerate() {
                *w = if vol.value(map, entry.ijk) > 0.0 { 1.0 } else { 0.0 };
            }
            add_row(input, entry.index, &weights, &mut scratch, &mut accum)?;
        }
    }

    Ok(accum
        .into_iter()
        .map(|acc| {
            let mean = if acc.is_empty() { 0.0 } else { acc.iter().sum::<f64>() / acc.len() as f64 };
            let row: Vec<f32> = acc.iter().map(|&v| (v - mean) as f32).collect();
            let rrs = sum_sq_dev_f64(&row, 0.0).sqrt();
            Seed { row, rrs }
        })
        .collect())
}

/// Read `index` once if any map uses it and add it with each map's weight.
fn add_row(
    input: &dyn RowMatrix,
    index: usize,
    weights: &[f64],
    scratch: &mut [f32],
    accum: &mut [Vec<f64>],
) -> Result<()> {
    if weights.iter().all(|&w| w == 0.0) {
        return Ok(());
    }
    input.read_row(index, scratch)?;
    for (acc, &w) in accum.iter_mut().zip(weights) {
        if w == 0.0 {
            continue;
        }
        for (a, &v) in acc.iter_mut().zip(scratch.iter()) {
            *a += v as f64 * w;
        }
    }
    Ok(())
}

/// Fisher-z correlation of every row of `input` with each seed.
fn process_input(
    input: &dyn RowMatrix,
    models: &BrainModelsMap,
    rois: &RoiMasks,
    areas: &VertexAreas,
    num_maps: usize,
) -> Result<Vec<Vec<f32>>> {
    let seeds = build_seeds(input, models, rois, areas, num_maps)?;
    for (map, seed) in seeds.iter().enumerate() {
        if seed.rrs == 0.0 {
            debug!("seed for map {} has no variance", map);
        }
    }

    let num_rows = input.num_rows();
    let prep = RowPrep::unweighted(input.num_cols());
    let cache = RowCache::new(input, &prep);
    let output = Mutex::new(vec![vec![0.0f32; num_maps]; num_rows]);

    (0..num_rows).into_par_iter().try_for_each(|_| -> Result<()> {
        let row = match cache.next_scan_row()? {
            Some(row) => row,
            None => return Ok(()),
        };
        let values: Vec<f32> = seeds
            .iter()
            .map(|seed| {
                let r = if seed.rrs == 0.0 || !row.stats.has_variance() {
                    0.0
                } else {
                    dot_product_f64(&row.data, &seed.row) / (seed.rrs * row.stats.rrs)
                };
                fisher_z(r) as f32
            })
            .collect();
        output.lock()[row.index] = values;
        Ok(())
    })?;

    Ok(output.into_inner())
}
