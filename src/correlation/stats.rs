//! Per-row statistics and row preparation
//!
//! Statistics are computed in two passes (mean, then residual sum of squares)
//! with `f64` accumulators. `RowPrep` applies the run's column weighting and
//! demeaning policy so that the correlation of two prepared rows reduces to a
//! single dot product divided by the two root residual sums of squares.

use crate::error::{CiftiError, Result};
use crate::utils::simd_ops::{dot_product_f64, sum_f64, sum_sq_dev_f64, subtract_scalar_f32};

/// Largest magnitude allowed into the Fisher transform.
pub const FISHER_Z_CLAMP: f64 = 0.999999;

/// Mean and root residual sum of squares of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowStats {
    pub mean: f64,
    /// sqrt(sum((x - mean)^2)), weighted when column weights are in use.
    pub rrs: f64,
}

impl RowStats {
    /// Two-pass statistics over every element of `row`.
    pub fn compute(row: &[f32]) -> Self {
        if row.is_empty() {
            return Self { mean: 0.0, rrs: 0.0 };
        }
        let mean = sum_f64(row) / row.len() as f64;
        let rrs = sum_sq_dev_f64(row, mean).sqrt();
        Self { mean, rrs }
    }

    /// Population standard deviation (divides by `n`, not `n - 1`).
    pub fn std_dev(&self, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        self.rrs / (n as f64).sqrt()
    }

    pub fn has_variance(&self) -> bool {
        self.rrs > 0.0
    }
}

/// Fisher z-transform after clamping `r` to `[-0.999999, 0.999999]`.
pub fn fisher_z(r: f64) -> f64 {
    let r = r.clamp(-FISHER_Z_CLAMP, FISHER_Z_CLAMP);
    0.5 * ((1.0 + r) / (1.0 - r)).ln()
}

#[derive(Debug, Clone, PartialEq)]
enum Weighting {
    Uniform,
    /// Every nonzero weight is 1; only the kept columns matter.
    Binary { indexes: Vec<usize> },
    Real {
        indexes: Vec<usize>,
        weights: Vec<f32>,
        weight_sum: f64,
    },
}

/// Column weighting and demeaning policy shared by every row of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPrep {
    num_cols: usize,
    weighting: Weighting,
    demean: bool,
    covariance: bool,
}

impl RowPrep {
    /// Plain Pearson preparation: demean, no weights.
    pub fn unweighted(num_cols: usize) -> Self {
        Self {
            num_cols,
            weighting: Weighting::Uniform,
            demean: true,
            covariance: false,
        }
    }

    /// Zero weights drop their column. If every weight is 1 the weights are
    /// ignored.
    pub fn new(num_cols: usize, weights: Option<&[f32]>, demean: bool, covariance: bool) -> Result<Self> {
        let weighting = match weights {
            None => Weighting::Uniform,
            Some(w) => {
                if w.len() != num_cols {
                    return Err(CiftiError::WeightCountMismatch {
                        expected: num_cols,
                        actual: w.len(),
                    });
                }
                let mut indexes = Vec::new();
                let mut kept = Vec::new();
                let mut binary = true;
                for (index, &value) in w.iter().enumerate() {
                    if value == 0.0 {
                        continue;
                    }
                    if value < 0.0 {
                        return Err(CiftiError::NegativeWeight { index, value });
                    }
                    if value != 1.0 {
                        binary = false;
                    }
                    indexes.push(index);
                    kept.push(value);
                }
                if binary && indexes.len() == num_cols {
                    Weighting::Uniform
                } else if binary {
                    Weighting::Binary { indexes }
                } else {
                    let weight_sum = kept.iter().map(|&v| v as f64).sum();
                    Weighting::Real {
                        indexes,
                        weights: kept,
                        weight_sum,
                    }
                }
            }
        };
        Ok(Self {
            num_cols,
            weighting,
            demean,
            covariance,
        })
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Length of a prepared row after zero-weight columns are dropped.
    pub fn prepared_len(&self) -> usize {
        match &self.weighting {
            Weighting::Uniform => self.num_cols,
            Weighting::Binary { indexes } | Weighting::Real { indexes, .. } => indexes.len(),
        }
    }

    pub fn is_weighted(&self) -> bool {
        !matches!(self.weighting, Weighting::Uniform)
    }

    /// Statistics of a raw row under this run's weighting.
    pub fn stats(&self, row: &[f32]) -> RowStats {
        match &self.weighting {
            Weighting::Uniform => {
                if self.demean {
                    RowStats::compute(row)
                } else {
                    RowStats {
                        mean: 0.0,
                        rrs: sum_sq_dev_f64(row, 0.0).sqrt(),
                    }
                }
            }
            Weighting::Binary { indexes } => {
                let mean = if self.demean && !indexes.is_empty() {
                    indexes.iter().map(|&i| row[i] as f64).sum::<f64>() / indexes.len() as f64
                } else {
                    0.0
                };
                let ss: f64 = indexes
                    .iter()
                    .map(|&i| {
                        let d = row[i] as f64 - mean;
                        d * d
                    })
                    .sum();
                RowStats { mean, rrs: ss.sqrt() }
            }
            Weighting::Real {
                indexes,
                weights,
                weight_sum,
            } => {
                let mean = if self.demean && *weight_sum > 0.0 {
                    indexes
                        .iter()
                        .zip(weights)
                        .map(|(&i, &w)| row[i] as f64 * w as f64)
                        .sum::<f64>()
                        / weight_sum
                } else {
                    0.0
                };
                let ss: f64 = indexes
                    .iter()
                    .zip(weights)
                    .map(|(&i, &w)| {
                        let d = row[i] as f64 - mean;
                        d * d * w as f64
                    })
                    .sum();
                RowStats { mean, rrs: ss.sqrt() }
            }
        }
    }

    /// Demean, compact, and weight `row` in place. Returns the prepared length;
    /// only `row[..len]` is meaningful afterwards.
    pub fn prepare(&self, row: &mut [f32], stats: &RowStats) -> usize {
        match &self.weighting {
            Weighting::Uniform => {
                if self.demean {
                    subtract_scalar_f32(row, stats.mean);
                }
                row.len()
            }
            Weighting::Binary { indexes } => {
                // indexes are increasing, so compacting forward never overwrites unread input
                for (dst, &src) in indexes.iter().enumerate() {
                    row[dst] = (row[src] as f64 - stats.mean) as f32;
                }
                indexes.len()
            }
            Weighting::Real { indexes, weights, .. } => {
                for (dst, (&src, &w)) in indexes.iter().zip(weights).enumerate() {
                    row[dst] = ((w as f64).sqrt() * (row[src] as f64 - stats.mean)) as f32;
                }
                indexes.len()
            }
        }
    }

    /// Correlation (or covariance) of two prepared rows.
    ///
    /// A row without variance correlates as 0 with everything, itself
    /// included. `same_row` short-circuits the diagonal to exactly 1.
    pub fn correlate(&self, a: &[f32], a_stats: &RowStats, b: &[f32], b_stats: &RowStats, fisher: bool, same_row: bool) -> f32 {
        if self.covariance {
            let dot = dot_product_f64(a, b);
            let divisor = match &self.weighting {
                Weighting::Uniform => self.num_cols as f64,
                Weighting::Binary { indexes } => indexes.len() as f64,
                Weighting::Real { weight_sum, .. } => *weight_sum,
            };
            return if divisor > 0.0 { (dot / divisor) as f32 } else { 0.0 };
        }
        let r = if !a_stats.has_variance() || !b_stats.has_variance() {
            0.0
        } else if same_row {
            1.0
        } else {
            dot_product_f64(a, b) / (a_stats.rrs * b_stats.rrs)
        };
        if fisher {
            fisher_z(r) as f32
        } else {
            r.clamp(-1.0, 1.0) as f32
        }
    }
}
