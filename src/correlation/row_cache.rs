//! Bounded row cache for chunked correlation
//!
//! The cache holds prepared (demeaned, weighted) copies of the rows that are
//! reused during one scan, plus a small pool of temporary buffers for rows
//! that are read once and thrown away. Statistics for each source row are
//! computed on first sight and then kept for the rest of the run.
//!
//! Reads from the backing matrix are serialized through one lock; the prepared
//! buffers are shared read-only afterwards.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::correlation::stats::{RowPrep, RowStats};
use crate::error::Result;
use crate::matrix::RowMatrix;

/// Number of idle temporary rows kept for reuse.
pub const TEMP_ROW_POOL_CAPACITY: usize = 5;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Full-input caching is chosen when the input takes less than this fraction
/// of the remaining budget.
const FULL_INPUT_FRACTION: f64 = 0.7;

// ============================================================================
// Capacity planning
// ============================================================================

/// How many fixed rows to process per chunk, and whether the whole input is
/// pre-cached once instead of per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePlan {
    pub rows_per_chunk: usize,
    pub cache_full_input: bool,
}

/// Per-row bookkeeping held for every source row during a run.
#[derive(Debug, Default)]
pub struct RowInfo {
    stats: OnceLock<RowStats>,
    slot: Option<usize>,
}

/// Rows per chunk that fit in `limit_gb`.
///
/// The budget is reduced by the resident input (if any), one scratch row per
/// worker thread, and one `RowInfo` per source row. If the whole input fits
/// in 70% of what remains it is cached once and only output rows count per
/// chunk; otherwise each chunk row costs one input and one output row. Never
/// returns fewer than one row.
pub fn num_rows_for_memory(
    limit_gb: f64,
    num_rows: usize,
    num_cols: usize,
    input_in_memory: bool,
    num_threads: usize,
) -> CachePlan {
    let in_row_bytes = (num_cols * std::mem::size_of::<f32>()) as i64;
    let out_row_bytes = (num_rows * std::mem::size_of::<f32>()) as i64;
    let input_bytes = num_rows as i64 * in_row_bytes;

    let mut target = (limit_gb * BYTES_PER_GB) as i64;
    if input_in_memory {
        target -= input_bytes;
    }
    target -= in_row_bytes * num_threads.max(1) as i64;
    target -= num_rows as i64 * std::mem::size_of::<RowInfo>() as i64;

    let mut per_row = in_row_bytes + out_row_bytes;
    let cache_full_input = (input_bytes as f64) < target as f64 * FULL_INPUT_FRACTION;
    if cache_full_input {
        target -= input_bytes;
        per_row = out_row_bytes;
    }
    let rows = if per_row == 0 { 1 } else { (target / per_row).max(1) };
    CachePlan {
        rows_per_chunk: rows as usize,
        cache_full_input,
    }
}

// ============================================================================
// Temporary rows
// ============================================================================

/// Small pool of scratch rows. Returned buffers are reused least recently
/// returned first; a lease that finds the pool empty allocates.
#[derive(Debug)]
pub struct TempRowPool {
    row_len: usize,
    idle: Mutex<VecDeque<Vec<f32>>>,
}

impl TempRowPool {
    pub fn new(row_len: usize) -> Self {
        Self {
            row_len,
            idle: Mutex::new(VecDeque::with_capacity(TEMP_ROW_POOL_CAPACITY)),
        }
    }

    pub fn lease(&self) -> TempRow<'_> {
        let buf = self.idle.lock().pop_front().unwrap_or_else(|| vec![0.0; self.row_len]);
        TempRow {
            pool: self,
            buf,
            len: self.row_len,
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn give_back(&self, buf: Vec<f32>) {
        let mut idle = self.idle.lock();
        if idle.len() < TEMP_ROW_POOL_CAPACITY {
            idle.push_back(buf);
        }
    }
}

/// Scratch row on loan from a `TempRowPool`; returned to the pool on drop.
#[derive(Debug)]
pub struct TempRow<'a> {
    pool: &'a TempRowPool,
    buf: Vec<f32>,
    len: usize,
}

impl TempRow<'_> {
    pub fn as_mut_full(&mut self) -> &mut [f32] {
        &mut self.buf
    }

    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.buf.len());
    }
}

impl Deref for TempRow<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.buf[..self.len]
    }
}

impl Drop for TempRow<'_> {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.give_back(buf);
    }
}

// ============================================================================
// Row cache
// ============================================================================

#[derive(Debug)]
struct CacheSlot {
    source: usize,
    row: Vec<f32>,
}

/// Prepared row plus its statistics, either borrowed from the cache or held
/// in a temporary buffer.
#[derive(Debug)]
pub enum RowData<'a> {
    Cached(&'a [f32]),
    Temp(TempRow<'a>),
}

impl Deref for RowData<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        match self {
            RowData::Cached(row) => row,
            RowData::Temp(row) => row,
        }
    }
}

#[derive(Debug)]
pub struct CachedRow<'a> {
    pub index: usize,
    pub data: RowData<'a>,
    pub stats: RowStats,
}

impl CachedRow<'_> {
    pub fn is_cached(&self) -> bool {
        matches!(self.data, RowData::Cached(_))
    }
}

/// Bounded set of prepared rows keyed by source row index.
pub struct RowCache<'a> {
    matrix: &'a dyn RowMatrix,
    prep: &'a RowPrep,
    slots: Vec<CacheSlot>,
    used: usize,
    info: Vec<RowInfo>,
    temp: TempRowPool,
    read_lock: Mutex<()>,
    scan_cursor: Mutex<usize>,
}

impl<'a> RowCache<'a> {
    pub fn new(matrix: &'a dyn RowMatrix, prep: &'a RowPrep) -> Self {
        let num_rows = matrix.num_rows();
        Self {
            matrix,
            prep,
            slots: Vec::new(),
            used: 0,
            info: (0..num_rows).map(|_| RowInfo::default()).collect(),
            temp: TempRowPool::new(matrix.num_cols()),
            read_lock: Mutex::new(()),
            scan_cursor: Mutex::new(0),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.info.len()
    }

    /// Load and prepare `index` into a cache slot. No-op if already cached.
    pub fn cache_row(&mut self, index: usize) -> Result<()> {
        if self.info[index].slot.is_some() {
            return Ok(());
        }
        if self.used >= self.slots.len() {
            self.slots.push(CacheSlot {
                source: index,
                row: vec![0.0; self.matrix.num_cols()],
            });
        }
        let slot = self.used;
        let buf = &mut self.slots[slot].row;
        buf.resize(self.matrix.num_cols(), 0.0);
        {
            let _guard = self.read_lock.lock();
            self.matrix.read_row(index, buf)?;
        }
        let info = &self.info[index];
        let stats = *info.stats.get_or_init(|| self.prep.stats(buf));
        let len = self.prep.prepare(buf, &stats);
        buf.truncate(len);
        self.slots[slot].source = index;
        self.info[index].slot = Some(slot);
        self.used += 1;
        Ok(())
    }

    /// Forget every slot assignment. Buffers are kept for the next chunk.
    pub fn clear_cache(&mut self) {
        for slot in &self.slots[..self.used] {
            self.info[slot.source].slot = None;
        }
        self.used = 0;
        self.rewind_scan();
    }

    /// Restart the sequential scan at row 0 without touching cached rows.
    pub fn rewind_scan(&mut self) {
        *self.scan_cursor.get_mut() = 0;
    }

    pub fn is_cached(&self, index: usize) -> bool {
        self.info[index].slot.is_some()
    }

    pub fn cached_count(&self) -> usize {
        self.used
    }

    /// Statistics of `index`, if it has been seen this run.
    pub fn stats(&self, index: usize) -> Option<RowStats> {
        self.info[index].stats.get().copied()
    }

    /// Prepared row `index`: borrowed from the cache when present, otherwise
    /// read into a temporary buffer.
    pub fn get_row(&self, index: usize) -> Result<CachedRow<'_>> {
        if let Some(slot) = self.info[index].slot {
            let stats = self.stats(index).unwrap_or_else(|| self.prep.stats(&self.slots[slot].row));
            return Ok(CachedRow {
                index,
                data: RowData::Cached(&self.slots[slot].row),
                stats,
            });
        }
        let mut temp = self.temp.lease();
        {
            let _guard = self.read_lock.lock();
            self.matrix.read_row(index, temp.as_mut_full())?;
        }
        Ok(self.finish_temp(index, temp))
    }

    /// Next row of a sequential scan over every source row, or `None` once the
    /// scan is complete. Picking the index and reading it happen under one
    /// lock so rows leave the backing store in order.
    pub fn next_scan_row(&self) -> Result<Option<CachedRow<'_>>> {
        let mut cursor = self.scan_cursor.lock();
        let index = *cursor;
        if index >= self.num_rows() {
            return Ok(None);
        }
        *cursor += 1;
        if self.info[index].slot.is_some() {
            drop(cursor);
            return self.get_row(index).map(Some);
        }
        let mut temp = self.temp.lease();
        {
            let _guard = self.read_lock.lock();
            self.matrix.read_row(index, temp.as_mut_full())?;
        }
        drop(cursor);
        Ok(Some(self.finish_temp(index, temp)))
    }

    fn finish_temp<'s>(&'s self, index: usize, mut temp: TempRow<'s>) -> CachedRow<'s> {
        let stats = *self.info[index].stats.get_or_init(|| self.prep.stats(&temp));
        let len = self.prep.prepare(temp.as_mut_full(), &stats);
        temp.set_len(len);
        CachedRow {
            index,
            data: RowData::Temp(temp),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::InMemoryMatrix;

    fn sample() -> InMemoryMatrix {
        InMemoryMatrix::dense_surface(&[
            vec![1.0, 2.0, 3.0],
            vec![2.0, 4.0, 6.0],
            vec![1.0, 1.0, 1.0],
            vec![-1.0, -2.0, -3.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_memory_floor_is_one() {
        for gb in [0.0, 1e-9, 0.001] {
            let plan = num_rows_for_memory(gb, 100_000, 1200, true, 8);
            assert!(plan.rows_per_chunk >= 1, "Expected at least 1, got {}", plan.rows_per_chunk);
        }
        let plan = num_rows_for_memory(0.0, 0, 0, false, 1);
        assert_eq!(plan.rows_per_chunk, 1);
    }

    #[test]
    fn test_memory_formula_streaming_case() {
        // 1000 rows x 250 columns, 1 MiB budget, on disk, one thread
        let plan = num_rows_for_memory(1.0 / 1024.0, 1000, 250, false, 1);
        let info = std::mem::size_of::<RowInfo>() as i64;
        let input = 1000 * 250 * 4i64;
        let target = 1024 * 1024 - 250 * 4 - 1000 * info;
        assert!((input as f64) >= target as f64 * 0.7);
        assert!(!plan.cache_full_input);
        assert_eq!(plan.rows_per_chunk as i64, target / (250 * 4 + 1000 * 4));
    }

    #[test]
    fn test_memory_formula_full_input_case() {
        let plan = num_rows_for_memory(1.0, 1000, 250, false, 4);
        let info = std::mem::size_of::<RowInfo>() as i64;
        let input = 1000 * 250 * 4i64;
        let target = (1i64 << 30) - 250 * 4 * 4 - 1000 * info - input;
        assert!(plan.cache_full_input);
        assert_eq!(plan.rows_per_chunk as i64, target / (1000 * 4));
    }

    #[test]
    fn test_memory_counts_resident_input() {
        let on_disk = num_rows_for_memory(0.01, 2000, 1000, false, 1);
        let resident = num_rows_for_memory(0.01, 2000, 1000, true, 1);
        assert!(resident.rows_per_chunk < on_disk.rows_per_chunk);
    }

    #[test]
    fn test_temp_pool_reuses_least_recently_returned() {
        let pool = TempRowPool::new(2);
        let mut a = pool.lease();
        a.as_mut_full()[0] = 1.0;
        let mut b = pool.lease();
        b.as_mut_full()[0] = 2.0;
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 2);
        let first = pool.lease();
        assert_eq!(first[0], 1.0);
        let second = pool.lease();
        assert_eq!(second[0], 2.0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_temp_pool_capacity() {
        let pool = TempRowPool::new(1);
        let leases: Vec<_> = (0..8).map(|_| pool.lease()).collect();
        drop(leases);
        assert_eq!(pool.idle_count(), TEMP_ROW_POOL_CAPACITY);
    }

    #[test]
    fn test_cache_and_clear() {
        let m = sample();
        let prep = RowPrep::unweighted(3);
        let mut cache = RowCache::new(&m, &prep);
        cache.cache_row(1).unwrap();
        cache.cache_row(1).unwrap();
        assert_eq!(cache.cached_count(), 1);
        let row = cache.get_row(1).unwrap();
        assert!(row.is_cached());
        assert_eq!(&*row.data, &[-2.0, 0.0, 2.0]);
        drop(row);

        cache.clear_cache();
        assert!(!cache.is_cached(1));
        let row = cache.get_row(1).unwrap();
        assert!(!row.is_cached());
        assert_eq!(&*row.data, &[-2.0, 0.0, 2.0]);
    }

    #[test]
    fn test_stats_computed_once_and_kept() {
        let m = sample();
        let prep = RowPrep::unweighted(3);
        let mut cache = RowCache::new(&m, &prep);
        assert!(cache.stats(0).is_none());
        cache.cache_row(0).unwrap();
        let first = cache.stats(0).unwrap();
        cache.clear_cache();
        let again = cache.get_row(0).unwrap().stats;
        assert_eq!(first, again);
        assert!((first.mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sequential_scan_visits_every_row_once() {
        let m = sample();
        let prep = RowPrep::unweighted(3);
        let mut cache = RowCache::new(&m, &prep);
        cache.cache_row(2).unwrap();
        let mut seen = Vec::new();
        while let Some(row) = cache.next_scan_row().unwrap() {
            seen.push((row.index, row.is_cached()));
        }
        assert_eq!(seen, vec![(0, false), (1, false), (2, true), (3, false)]);
        cache.clear_cache();
        assert_eq!(cache.next_scan_row().unwrap().map(|r| r.index), Some(0));
    }
}
