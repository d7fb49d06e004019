//! SIMD-accelerated row reductions
//!
//! Rows are stored as `f32`, but every reduction here accumulates in `f64` so
//! that rows with tens of thousands of columns keep their precision. When the
//! `simd` feature is enabled the loops run four lanes at a time with `f64x4`.
//!
//! All operations have scalar fallbacks when SIMD is disabled.

#[cfg(feature = "simd")]
use wide::f64x4;

/// SIMD lane width (4 for f64x4)
#[cfg(feature = "simd")]
pub const SIMD_WIDTH: usize = 4;

#[cfg(not(feature = "simd"))]
pub const SIMD_WIDTH: usize = 1;

#[cfg(feature = "simd")]
#[inline]
fn widen(a: &[f32]) -> f64x4 {
    f64x4::from([a[0] as f64, a[1] as f64, a[2] as f64, a[3] as f64])
}

// ============================================================================
// Dot Product
// ============================================================================

/// Compute sum(a[i] * b[i]) with a double-precision accumulator
#[cfg(feature = "simd")]
#[inline]
pub fn dot_product_f64(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();
    let chunks = n / SIMD_WIDTH;

    let mut sum = f64x4::ZERO;
    for i in 0..chunks {
        let idx = i * SIMD_WIDTH;
        sum += widen(&a[idx..idx + SIMD_WIDTH]) * widen(&b[idx..idx + SIMD_WIDTH]);
    }

    let mut result = sum.reduce_add();
    for i in chunks * SIMD_WIDTH..n {
        result += a[i] as f64 * b[i] as f64;
    }
    result
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn dot_product_f64(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&ai, &bi)| ai as f64 * bi as f64).sum()
}

// ============================================================================
// Sums
// ============================================================================

/// Compute sum(a[i]) with a double-precision accumulator
#[cfg(feature = "simd")]
#[inline]
pub fn sum_f64(a: &[f32]) -> f64 {
    let n = a.len();
    let chunks = n / SIMD_WIDTH;

    let mut sum = f64x4::ZERO;
    for i in 0..chunks {
        let idx = i * SIMD_WIDTH;
        sum += widen(&a[idx..idx + SIMD_WIDTH]);
    }

    let mut result = sum.reduce_add();
    for &v in &a[chunks * SIMD_WIDTH..] {
        result += v as f64;
    }
    result
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn sum_f64(a: &[f32]) -> f64 {
    a.iter().map(|&v| v as f64).sum()
}

/// Compute sum((a[i] - mean)^2) with a double-precision accumulator
#[cfg(feature = "simd")]
#[inline]
pub fn sum_sq_dev_f64(a: &[f32], mean: f64) -> f64 {
    let n = a.len();
    let chunks = n / SIMD_WIDTH;

    let vmean = f64x4::splat(mean);
    let mut sum = f64x4::ZERO;
    for i in 0..chunks {
        let idx = i * SIMD_WIDTH;
        let d = widen(&a[idx..idx + SIMD_WIDTH]) - vmean;
        sum += d * d;
    }

    let mut result = sum.reduce_add();
    for &v in &a[chunks * SIMD_WIDTH..] {
        let d = v as f64 - mean;
        result += d * d;
    }
    result
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn sum_sq_dev_f64(a: &[f32], mean: f64) -> f64 {
    a.iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum()
}

// ============================================================================
// Element-wise
// ============================================================================

/// Subtract `mean` from every element in place: a[i] = a[i] - mean
#[inline]
pub fn subtract_scalar_f32(a: &mut [f32], mean: f64) {
    for v in a.iter_mut() {
        *v = (*v as f64 - mean) as f32;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product() {
        let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        let b = vec![2.0f32, 3.0, 4.0, 5.0, 6.0];

        let result = dot_product_f64(&a, &b);
        let expected: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();

        assert!((result - expected).abs() < 1e-12);
    }

    #[test]
    fn test_sum() {
        let a = vec![1.5f32, -2.0, 3.25, 4.0, 5.0, 0.25, 7.0];
        let expected: f64 = a.iter().map(|&x| x as f64).sum();
        assert!((sum_f64(&a) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_sum_sq_dev() {
        let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        // deviations from 3: -2, -1, 0, 1, 2
        assert!((sum_sq_dev_f64(&a, 3.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_double_accumulation_keeps_precision() {
        // An f32 accumulator drifts visibly over this many small values
        let a = vec![0.1f32; 100_000];
        let expected = 100_000.0 * (0.1f32 as f64);
        assert!((sum_f64(&a) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_subtract_scalar() {
        let mut a = vec![1.0f32, 2.0, 3.0];
        subtract_scalar_f32(&mut a, 2.0);
        assert_eq!(a, vec![-1.0, 0.0, 1.0]);
    }
}
