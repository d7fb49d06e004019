//! Voxel grid dimensions and index-to-space transform shared by volume models.

use serde::{Deserialize, Serialize};

/// Relative agreement required for two sform terms to be considered equal.
const SFORM_TOLERANCE: f32 = 0.999;

/// Dimensions plus the first three rows of the sform matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpace {
    pub dims: [i64; 3],
    pub sform: [[f32; 4]; 3],
}

impl VolumeSpace {
    pub fn new(dims: [i64; 3], sform: [[f32; 4]; 3]) -> Self {
        Self { dims, sform }
    }

    /// Identity transform with the given dimensions.
    pub fn with_dims(dims: [i64; 3]) -> Self {
        Self {
            dims,
            sform: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }

    pub fn num_voxels(&self) -> usize {
        self.dims.iter().map(|&d| d.max(0) as usize).product()
    }

    pub fn index_valid(&self, i: i64, j: i64, k: i64) -> bool {
        i >= 0 && j >= 0 && k >= 0 && i < self.dims[0] && j < self.dims[1] && k < self.dims[2]
    }

    /// Fortran-order offset of a voxel (i fastest), or `None` if out of range.
    pub fn linear_offset(&self, i: i64, j: i64, k: i64) -> Option<usize> {
        if !self.index_valid(i, j, k) {
            return None;
        }
        let (nx, ny) = (self.dims[0] as usize, self.dims[1] as usize);
        Some(i as usize + j as usize * nx + k as usize * nx * ny)
    }

    /// Dimensions must be equal; each sform term must agree within 0.1%.
    pub fn matches(&self, other: &VolumeSpace) -> bool {
        if self.dims != other.dims {
            return false;
        }
        for row in 0..3 {
            for col in 0..4 {
                let left = self.sform[row][col];
                let right = other.sform[row][col];
                if left != right
                    && (left == 0.0
                        || right == 0.0
                        || left / right < SFORM_TOLERANCE
                        || right / left < SFORM_TOLERANCE)
                {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_valid() {
        let space = VolumeSpace::with_dims([2, 3, 4]);
        assert!(space.index_valid(0, 0, 0));
        assert!(space.index_valid(1, 2, 3));
        assert!(!space.index_valid(2, 0, 0));
        assert!(!space.index_valid(0, -1, 0));
        assert_eq!(space.num_voxels(), 24);
    }

    #[test]
    fn test_linear_offset_fortran_order() {
        let space = VolumeSpace::with_dims([2, 3, 4]);
        assert_eq!(space.linear_offset(1, 0, 0), Some(1));
        assert_eq!(space.linear_offset(0, 1, 0), Some(2));
        assert_eq!(space.linear_offset(0, 0, 1), Some(6));
        assert_eq!(space.linear_offset(5, 0, 0), None);
    }

    #[test]
    fn test_matches_within_tolerance() {
        let a = VolumeSpace::new(
            [10, 10, 10],
            [[2.0, 0.0, 0.0, -90.0], [0.0, 2.0, 0.0, -126.0], [0.0, 0.0, 2.0, -72.0]],
        );
        let mut b = a.clone();
        b.sform[0][3] = -90.05;
        assert!(a.matches(&b));
        b.sform[0][3] = -92.0;
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_matches_rejects_zero_against_nonzero() {
        let a = VolumeSpace::with_dims([4, 4, 4]);
        let mut b = a.clone();
        b.sform[0][1] = 1e-6;
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_matches_rejects_sign_flip_and_dims() {
        let a = VolumeSpace::with_dims([4, 4, 4]);
        let mut b = a.clone();
        b.sform[0][0] = -1.0;
        assert!(!a.matches(&b));
        let c = VolumeSpace::with_dims([4, 4, 5]);
        assert!(!a.matches(&c));
    }
}
