//! Full and ROI-restricted row correlation
//!
//! Every "fixed" row (all rows, or the rows selected by an ROI) is correlated
//! against every "moving" row of the input. Two strategies:
//!
//! - **Direct**: the input is resident and no budget or chunk size was given.
//!   All rows are prepared once and fixed rows are computed in parallel
//!   batches, each output row written as soon as its batch finishes.
//! - **Chunked**: fixed rows are processed `rows_per_chunk` at a time. The
//!   chunk's rows are cached, then one sequential scan over the input
//!   correlates each moving row against the whole chunk. For full correlation
//!   a moving row that falls inside the chunk only computes the upper half and
//!   stores each value in both places.
//!
//! Moving-row reads are serialized in row order; the correlation math runs
//! on rayon's pool.

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cifti::{CiftiXml, IndexMap};
use crate::correlation::roi::{remap, RoiMasks, RowPair};
use crate::correlation::row_cache::{num_rows_for_memory, CachePlan, CachedRow, RowCache};
use crate::correlation::stats::RowPrep;
use crate::error::{CiftiError, Result};
use crate::matrix::{CiftiSink, RowMatrix};

/// Fixed rows per parallel batch on the direct path, per worker thread.
const DIRECT_BATCH_PER_THREAD: usize = 4;

// ============================================================================
// Options
// ============================================================================

/// Settings for one correlation run.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationOptions {
    /// Apply the Fisher z-transform to each correlation.
    pub fisher_z: bool,
    /// Memory budget in GiB. `None` means unlimited; `0` computes one row at a time.
    pub mem_limit_gb: Option<f64>,
    /// Subtract the row mean before correlating.
    pub demean: bool,
    /// Output covariance instead of correlation.
    pub covariance: bool,
    /// One non-negative weight per column.
    pub weights: Option<Vec<f32>>,
    /// Explicit fixed rows per chunk, overriding the memory budget.
    pub chunk_rows: Option<usize>,
}

impl Default for CorrelationOptions {
    fn default() -> Self {
        Self {
            fisher_z: false,
            mem_limit_gb: None,
            demean: true,
            covariance: false,
            weights: None,
            chunk_rows: None,
        }
    }
}

impl CorrelationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fisher_z(mut self, fisher_z: bool) -> Self {
        self.fisher_z = fisher_z;
        self
    }

    pub fn with_mem_limit_gb(mut self, limit: f64) -> Self {
        self.mem_limit_gb = Some(limit);
        self
    }

    pub fn with_demean(mut self, demean: bool) -> Self {
        self.demean = demean;
        self
    }

    pub fn with_covariance(mut self, covariance: bool) -> Self {
        self.covariance = covariance;
        self
    }

    pub fn with_weights(mut self, weights: Vec<f32>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = Some(rows);
        self
    }

    /// Checks that do not depend on the input matrix.
    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = self.mem_limit_gb {
            if limit < 0.0 || limit.is_nan() {
                return Err(CiftiError::NegativeMemoryLimit);
            }
        }
        if self.covariance && self.fisher_z {
            return Err(CiftiError::FisherZWithCovariance);
        }
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Correlation driver bound to one input matrix.
pub struct CorrelationEngine<'a> {
    matrix: &'a dyn RowMatrix,
    options: CorrelationOptions,
    prep: RowPrep,
}

impl<'a> CorrelationEngine<'a> {
    /// Validates `options` against `matrix` before any row is read.
    pub fn new(matrix: &'a dyn RowMatrix, options: &CorrelationOptions) -> Result<Self> {
        options.validate()?;
        let prep = RowPrep::new(
            matrix.num_cols(),
            options.weights.as_deref(),
            options.demean,
            options.covariance,
        )?;
        Ok(Self {
            matrix,
            options: options.clone(),
            prep,
        })
    }

    pub fn options(&self) -> &CorrelationOptions {
        &self.options
    }

    /// Chunk size and caching policy for `num_fixed` fixed rows.
    pub fn plan(&self, num_fixed: usize) -> CachePlan {
        let mut plan = if let Some(rows) = self.options.chunk_rows {
            CachePlan {
                rows_per_chunk: rows.max(1),
                cache_full_input: false,
            }
        } else if let Some(limit) = self.options.mem_limit_gb {
            num_rows_for_memory(
                limit,
                self.matrix.num_rows(),
                self.matrix.num_cols(),
                self.matrix.is_in_memory(),
                rayon::current_num_threads(),
            )
        } else {
            CachePlan {
                rows_per_chunk: num_fixed,
                cache_full_input: true,
            }
        };
        plan.rows_per_chunk = plan.rows_per_chunk.min(num_fixed).max(1);
        plan
    }

    fn use_direct(&self) -> bool {
        self.matrix.is_in_memory() && self.options.mem_limit_gb.is_none() && self.options.chunk_rows.is_none()
    }

    /// Correlate every row with every row. The output is square and both of
    /// its axes carry the input's row mapping.
    pub fn correlate_all(&self, out: &mut dyn CiftiSink) -> Result<CiftiXml> {
        let mut xml = self.matrix.cifti_xml().clone();
        xml.apply_row_map_to_columns();
        out.set_cifti_xml(xml.clone())?;

        let pairs: Vec<RowPair> = (0..self.matrix.num_rows())
            .map(|i| RowPair { source: i, output: i })
            .collect();
        self.run(&pairs, true, out)?;
        Ok(xml)
    }

    /// Correlate the rows selected by `rois` with every row. Output rows are
    /// the selected brainordinates, output columns the input's row mapping.
    pub fn correlate_roi(&self, rois: &RoiMasks, out: &mut dyn CiftiSink) -> Result<CiftiXml> {
        let input_rows = &self.matrix.cifti_xml().rows;
        let models = match input_rows {
            IndexMap::BrainModels(models) => models,
            _ => return Err(CiftiError::NotBrainModels { axis: "rows" }),
        };
        let selection = remap(models, rois)?;
        info!(
            "roi selects {} of {} rows",
            selection.len(),
            self.matrix.num_rows()
        );
        let xml = CiftiXml::new(IndexMap::BrainModels(selection.mapping.clone()), input_rows.clone());
        out.set_cifti_xml(xml.clone())?;

        self.run(&selection.pairs, false, out)?;
        Ok(xml)
    }

    fn run(&self, pairs: &[RowPair], symmetric: bool, out: &mut dyn CiftiSink) -> Result<()> {
        if pairs.is_empty() || self.matrix.num_rows() == 0 {
            return Ok(());
        }
        if self.use_direct() {
            debug!("input is resident, correlating {} rows directly", pairs.len());
            return self.run_direct(pairs, out);
        }

        let plan = self.plan(pairs.len());
        if plan.cache_full_input {
            if plan.rows_per_chunk != pairs.len() {
                info!("computing {} rows at a time", plan.rows_per_chunk);
            }
        } else {
            info!(
                "computing {} rows at a time, reading rows as needed during processing",
                plan.rows_per_chunk
            );
        }

        let mut cache = RowCache::new(self.matrix, &self.prep);
        if plan.cache_full_input {
            for i in 0..self.matrix.num_rows() {
                cache.cache_row(i)?;
            }
        }
        let num_chunks = pairs.len().div_ceil(plan.rows_per_chunk);
        for (chunk_no, chunk) in pairs.chunks(plan.rows_per_chunk).enumerate() {
            if !plan.cache_full_input {
                for pair in chunk {
                    cache.cache_row(pair.source)?;
                }
            }
            let rows = self.scan_chunk(&cache, chunk, symmetric)?;
            for (pair, row) in chunk.iter().zip(&rows) {
                out.set_row(pair.output, row)?;
            }
            if plan.cache_full_input {
                cache.rewind_scan();
            } else {
                cache.clear_cache();
            }
            debug!("finished chunk {}/{}", chunk_no + 1, num_chunks);
        }
        Ok(())
    }

    /// One sequential scan of the input against the cached rows of `chunk`.
    fn scan_chunk(&self, cache: &RowCache<'_>, chunk: &[RowPair], symmetric: bool) -> Result<Vec<Vec<f32>>> {
        let num_rows = cache.num_rows();
        let fixed: Vec<CachedRow<'_>> = chunk
            .iter()
            .map(|pair| cache.get_row(pair.source))
            .collect::<Result<_>>()?;
        // full correlation chunks are contiguous runs of source rows
        let start = chunk[0].source;
        let end = start + chunk.len();
        let fisher = self.options.fisher_z;
        let output = Mutex::new(vec![vec![0.0f32; num_rows]; chunk.len()]);

        (0..num_rows).into_par_iter().try_for_each(|_| -> Result<()> {
            let moving = match cache.next_scan_row()? {
                Some(row) => row,
                None => return Ok(()),
            };
            let m = moving.index;
            let in_chunk = symmetric && m >= start && m < end;

            let mut column = Vec::with_capacity(fixed.len());
            for (pos, f) in fixed.iter().enumerate() {
                if in_chunk && f.index < m {
                    continue;
                }
                let value = self
                    .prep
                    .correlate(&moving.data, &moving.stats, &f.data, &f.stats, fisher, f.index == m);
                column.push((pos, value));
            }

            let mut rows = output.lock();
            for (pos, value) in column {
                rows[pos][m] = value;
                if in_chunk {
                    rows[m - start][fixed[pos].index] = value;
                }
            }
            Ok(())
        })?;

        Ok(output.into_inner())
    }

    fn run_direct(&self, pairs: &[RowPair], out: &mut dyn CiftiSink) -> Result<()> {
        let num_rows = self.matrix.num_rows();
        let mut cache = RowCache::new(self.matrix, &self.prep);
        for i in 0..num_rows {
            cache.cache_row(i)?;
        }
        let rows: Vec<CachedRow<'_>> = (0..num_rows).map(|i| cache.get_row(i)).collect::<Result<_>>()?;
        let fisher = self.options.fisher_z;
        let batch = rayon::current_num_threads().max(1) * DIRECT_BATCH_PER_THREAD;

        for group in pairs.chunks(batch) {
            let results: Vec<Vec<f32>> = group
                .par_iter()
                .map(|pair| {
                    let f = &rows[pair.source];
                    rows.iter()
                        .map(|m| {
                            self.prep
                                .correlate(&m.data, &m.stats, &f.data, &f.stats, fisher, m.index == f.index)
                        })
                        .collect()
                })
                .collect();
            for (pair, row) in group.iter().zip(&results) {
                out.set_row(pair.output, row)?;
            }
        }
        Ok(())
    }
}

/// Correlate every row of `matrix` with every other row.
pub fn correlate_all(matrix: &dyn RowMatrix, out: &mut dyn CiftiSink, options: &CorrelationOptions) -> Result<CiftiXml> {
    CorrelationEngine::new(matrix, options)?.correlate_all(out)
}

/// Correlate the rows of `matrix` selected by `rois` with every row.
pub fn correlate_roi(
    matrix: &dyn RowMatrix,
    rois: &RoiMasks,
    out: &mut dyn CiftiSink,
    options: &CorrelationOptions,
) -> Result<CiftiXml> {
    CorrelationEngine::new(matrix, options)?.correlate_roi(rois, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cifti::{BrainModelsMap, ScalarsMap, Structure};
    use crate::correlation::roi::SurfaceRoi;
    use crate::correlation::stats::fisher_z;
    use crate::matrix::InMemoryMatrix;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Resident matrix that reports itself as on-disk, forcing the chunked path.
    struct Streamed(InMemoryMatrix);

    impl RowMatrix for Streamed {
        fn cifti_xml(&self) -> &CiftiXml {
            self.0.cifti_xml()
        }

        fn is_in_memory(&self) -> bool {
            false
        }

        fn read_row(&self, row: usize, out: &mut [f32]) -> Result<()> {
            self.0.read_row(row, out)
        }
    }

    fn example() -> InMemoryMatrix {
        InMemoryMatrix::dense_surface(&[
            vec![1.0, 2.0, 3.0],
            vec![2.0, 4.0, 6.0],
            vec![1.0, 1.0, 1.0],
            vec![-1.0, -2.0, -3.0],
        ])
        .unwrap()
    }

    fn noisy(rows: usize, cols: usize) -> InMemoryMatrix {
        let data: Vec<Vec<f32>> = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| ((r * 7 + c * 13) % 11) as f32 + (r as f32 * 0.37 + c as f32).sin())
                    .collect()
            })
            .collect();
        InMemoryMatrix::dense_surface(&data).unwrap()
    }

    fn run_all(matrix: &dyn RowMatrix, options: &CorrelationOptions) -> Vec<Vec<f32>> {
        let mut out = InMemoryMatrix::default();
        correlate_all(matrix, &mut out, options).unwrap();
        out.to_rows()
    }

    fn assert_close(a: &[Vec<f32>], b: &[Vec<f32>], tol: f32) {
        assert_eq!(a.len(), b.len());
        for (ra, rb) in a.iter().zip(b) {
            for (x, y) in ra.iter().zip(rb) {
                assert!((x - y).abs() < tol, "{} vs {}", x, y);
            }
        }
    }

    #[test]
    fn test_options_validation() {
        assert!(matches!(
            CorrelationOptions::new().with_mem_limit_gb(-1.0).validate(),
            Err(CiftiError::NegativeMemoryLimit)
        ));
        assert!(matches!(
            CorrelationOptions::new().with_covariance(true).with_fisher_z(true).validate(),
            Err(CiftiError::FisherZWithCovariance)
        ));
        assert!(CorrelationOptions::new().with_mem_limit_gb(0.0).validate().is_ok());
    }

    #[test]
    fn test_end_to_end_example() {
        let result = run_all(&example(), &CorrelationOptions::default());
        assert!((result[0][1] - 1.0).abs() < 1e-6);
        assert!((result[0][3] + 1.0).abs() < 1e-6);
        assert!((result[1][3] + 1.0).abs() < 1e-6);
        for j in 0..4 {
            assert_eq!(result[2][j], 0.0);
            assert_eq!(result[j][2], 0.0);
        }
        assert_eq!(result[0][0], 1.0);
        assert_eq!(result[3][3], 1.0);
    }

    #[test]
    fn test_output_mapping_is_square() {
        let input = example();
        let mut out = InMemoryMatrix::default();
        let xml = correlate_all(&input, &mut out, &CorrelationOptions::default()).unwrap();
        assert_eq!(xml.num_rows(), 4);
        assert_eq!(xml.num_cols(), 4);
        assert!(xml.rows.matches(&input.cifti_xml().rows));
        assert!(xml.columns.matches(&input.cifti_xml().rows));
    }

    #[test]
    fn test_symmetry_and_unit_diagonal() {
        let result = run_all(&noisy(9, 17), &CorrelationOptions::default());
        for i in 0..9 {
            assert_eq!(result[i][i], 1.0);
            for j in 0..9 {
                assert!((result[i][j] - result[j][i]).abs() < 1e-6);
                assert!(result[i][j].abs() <= 1.0);
            }
        }
    }

    #[test]
    fn test_chunking_equivalence() {
        let input = noisy(11, 23);
        let direct = run_all(&input, &CorrelationOptions::default());
        let streamed = Streamed(input.clone());
        for rows in [1, 3, 11] {
            let chunked = run_all(&streamed, &CorrelationOptions::new().with_chunk_rows(rows));
            assert_close(&direct, &chunked, 1e-6);
            let resident_chunked = run_all(&input, &CorrelationOptions::new().with_chunk_rows(rows));
            assert_close(&direct, &resident_chunked, 1e-6);
        }
        let one_at_a_time = run_all(&streamed, &CorrelationOptions::new().with_mem_limit_gb(0.0));
        assert_close(&direct, &one_at_a_time, 1e-6);
        let roomy = run_all(&streamed, &CorrelationOptions::new().with_mem_limit_gb(1.0));
        assert_close(&direct, &roomy, 1e-6);
    }

    /// Streams rows and records whether two reads were ever in flight at once.
    struct Serialized {
        inner: InMemoryMatrix,
        active: AtomicUsize,
        overlaps: AtomicUsize,
        reads: AtomicUsize,
    }

    impl RowMatrix for Serialized {
        fn cifti_xml(&self) -> &CiftiXml {
            self.inner.cifti_xml()
        }

        fn is_in_memory(&self) -> bool {
            false
        }

        fn read_row(&self, row: usize, out: &mut [f32]) -> Result<()> {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_micros(200));
            let result = self.inner.read_row(row, out);
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[test]
    fn test_parallel_scan_reads_one_row_at_a_time() {
        let input = noisy(64, 9);
        let direct = run_all(&input, &CorrelationOptions::default());
        let source = Serialized {
            inner: input,
            active: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        };
        let chunked = run_all(&source, &CorrelationOptions::new().with_chunk_rows(5));
        assert_close(&direct, &chunked, 1e-6);
        assert_eq!(source.overlaps.load(Ordering::SeqCst), 0);
        assert!(source.reads.load(Ordering::SeqCst) >= 64);
    }

    #[test]
    fn test_fisher_z_is_clamped() {
        let result = run_all(&example(), &CorrelationOptions::new().with_fisher_z(true));
        let top = fisher_z(1.0) as f32;
        assert!(top.is_finite());
        assert!((result[0][1] - top).abs() < 1e-4);
        assert!((result[0][3] + top).abs() < 1e-4);
        assert!((result[0][0] - top).abs() < 1e-4);
        assert_eq!(result[2][0], 0.0);
    }

    #[test]
    fn test_covariance_mode() {
        let input = InMemoryMatrix::dense_surface(&[vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0]]).unwrap();
        let result = run_all(&input, &CorrelationOptions::new().with_covariance(true));
        // population covariance of [1,2,3] with [2,4,6] is 4/3
        assert!((result[0][1] - 4.0 / 3.0).abs() < 1e-6);
        assert!((result[0][0] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_weights_drop_columns() {
        let input = InMemoryMatrix::dense_surface(&[vec![1.0, 2.0, 3.0, 100.0], vec![2.0, 4.0, 6.0, -50.0]]).unwrap();
        let result = run_all(&input, &CorrelationOptions::new().with_weights(vec![1.0, 1.0, 1.0, 0.0]));
        assert!((result[0][1] - 1.0).abs() < 1e-6);
    }

    fn roi_input() -> InMemoryMatrix {
        let models = BrainModelsMap::new()
            .with_surface_model(Structure::CortexLeft, 3, None)
            .unwrap()
            .with_surface_model(Structure::CortexRight, 2, None)
            .unwrap();
        let rows: Vec<Vec<f32>> = noisy(5, 8).to_rows();
        let xml = CiftiXml::new(IndexMap::BrainModels(models), IndexMap::Scalars(ScalarsMap::with_count(8)));
        InMemoryMatrix::from_rows(xml, &rows).unwrap()
    }

    #[test]
    fn test_roi_rows_match_full_rows() {
        let input = roi_input();
        let full = run_all(&input, &CorrelationOptions::default());
        let rois = RoiMasks::new()
            .with_left(SurfaceRoi::new(vec![0.0, 1.0, 0.0]))
            .with_right(SurfaceRoi::new(vec![1.0, 1.0]));

        for options in [
            CorrelationOptions::default(),
            CorrelationOptions::new().with_chunk_rows(1),
            CorrelationOptions::new().with_mem_limit_gb(0.0),
        ] {
            let mut out = InMemoryMatrix::default();
            let xml = correlate_roi(&Streamed(input.clone()), &rois, &mut out, &options).unwrap();
            assert_eq!(xml.num_rows(), 3);
            assert_eq!(xml.num_cols(), 5);
            let rows = out.to_rows();
            assert_close(&rows, &[full[1].clone(), full[3].clone(), full[4].clone()], 1e-6);
        }
    }

    #[test]
    fn test_roi_empty_selection_fails() {
        let rois = RoiMasks::new().with_left(SurfaceRoi::new(vec![0.0; 3]));
        let mut out = InMemoryMatrix::default();
        let err = correlate_roi(&roi_input(), &rois, &mut out, &CorrelationOptions::default()).unwrap_err();
        assert!(matches!(err, CiftiError::EmptySelection));
    }

    #[test]
    fn test_roi_requires_brain_models() {
        let xml = CiftiXml::new(
            IndexMap::Scalars(ScalarsMap::with_count(2)),
            IndexMap::Scalars(ScalarsMap::with_count(2)),
        );
        let input = InMemoryMatrix::zeros(xml);
        let rois = RoiMasks::new().with_left(SurfaceRoi::new(vec![1.0]));
        let mut out = InMemoryMatrix::default();
        assert!(matches!(
            correlate_roi(&input, &rois, &mut out, &CorrelationOptions::default()),
            Err(CiftiError::NotBrainModels { .. })
        ));
    }

    #[test]
    fn test_plan_respects_overrides() {
        let input = noisy(10, 4);
        let engine = CorrelationEngine::new(&input, &CorrelationOptions::new().with_chunk_rows(50)).unwrap();
        assert_eq!(engine.plan(10), CachePlan { rows_per_chunk: 10, cache_full_input: false });
        let engine = CorrelationEngine::new(&input, &CorrelationOptions::default()).unwrap();
        assert_eq!(engine.plan(7), CachePlan { rows_per_chunk: 7, cache_full_input: true });
        let engine = CorrelationEngine::new(&input, &CorrelationOptions::new().with_mem_limit_gb(0.0)).unwrap();
        assert_eq!(engine.plan(10).rows_per_chunk, 1);
    }
}
