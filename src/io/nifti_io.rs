//! NIfTI volume ROI I/O
//!
//! Loads volume ROIs (one frame per ROI map) from `.nii` or `.nii.gz` bytes.
//! Voxel data is kept in Fortran order (i varies fastest) to match
//! `VolumeSpace::linear_offset`.

use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use ndarray::{Array, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};
use tracing::debug;

use crate::cifti::VolumeSpace;
use crate::correlation::roi::VolumeRoi;
use crate::error::{CiftiError, Result};

const HEADER_SIZE: usize = 348;

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Header summary for error messages
fn header_info(bytes: &[u8]) -> String {
    if bytes.len() < HEADER_SIZE {
        return format!("file too small ({} bytes, need at least {})", bytes.len(), HEADER_SIZE);
    }
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);
    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

/// 3x4 sform of the volume: srow_x/y/z when `sform_code > 0`, otherwise the
/// voxel sizes on the diagonal.
fn sform_from_header(header: &NiftiHeader) -> [[f32; 4]; 3] {
    if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z]
    } else {
        [
            [header.pixdim[1], 0.0, 0.0, 0.0],
            [0.0, header.pixdim[2], 0.0, 0.0],
            [0.0, 0.0, header.pixdim[3], 0.0],
        ]
    }
}

/// Load a volume ROI from `.nii` or `.nii.gz` bytes (gzip is auto-detected).
///
/// A 4D volume yields one ROI map per frame.
pub fn load_volume_roi(bytes: &[u8]) -> Result<VolumeRoi> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        let mut decompressed = Vec::new();
        GzDecoder::new(Cursor::new(bytes)).read_to_end(&mut decompressed)?;
        InMemNiftiObject::from_reader(Cursor::new(&decompressed))
            .map_err(|e| CiftiError::Nifti(format!("{} ({})", e, header_info(&decompressed))))?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| CiftiError::Nifti(format!("{} ({})", e, header_info(bytes))))?
    };

    let header = obj.header();
    let ndim = header.dim[0];
    if ndim < 3 {
        return Err(CiftiError::Nifti(format!("expected at least a 3D volume, got {}D", ndim)));
    }
    let sform = sform_from_header(header);

    let array: Array<f32, IxDyn> = obj.into_volume().into_ndarray()?;
    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(CiftiError::Nifti(format!("expected at least a 3D array, got {}D", shape.len())));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let frames = shape[3..].iter().product::<usize>().max(1);

    let mut maps = Vec::with_capacity(frames);
    for t in 0..frames {
        let mut data = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let value = if shape.len() == 3 {
                        array[[i, j, k].as_slice()]
                    } else {
                        array[[i, j, k, t].as_slice()]
                    };
                    data.push(value);
                }
            }
        }
        maps.push(data);
    }
    debug!("loaded volume roi {}x{}x{} with {} frames", nx, ny, nz, frames);

    let space = VolumeSpace::new([nx as i64, ny as i64, nz as i64], sform);
    let names = vec![String::new(); frames];
    VolumeRoi::with_maps(space, maps, names)
}

/// Read a volume ROI file from disk.
pub fn read_volume_roi(path: impl AsRef<Path>) -> Result<VolumeRoi> {
    let bytes = std::fs::read(path)?;
    load_volume_roi(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const VOX_OFFSET: usize = 352;

    /// Encode a volume ROI as uncompressed single-file NIfTI-1 (float32).
    fn encode_volume_roi(roi: &VolumeRoi) -> Result<Vec<u8>> {
        let space = roi.space();
        let [nx, ny, nz] = space.dims;
        let frames = roi.num_maps();
        let mut header = [0u8; HEADER_SIZE];

        header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());

        let ndim: i16 = if frames > 1 { 4 } else { 3 };
        let dim: [i16; 8] = [ndim, nx as i16, ny as i16, nz as i16, frames as i16, 1, 1, 1];
        for (i, &d) in dim.iter().enumerate() {
            let offset = 40 + i * 2;
            header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
        }

        // datatype = 16 (FLOAT32), bitpix = 32
        header[70..72].copy_from_slice(&16i16.to_le_bytes());
        header[72..74].copy_from_slice(&32i16.to_le_bytes());

        let s = &space.sform;
        let voxel_size = |row: usize| (s[0][row].powi(2) + s[1][row].powi(2) + s[2][row].powi(2)).sqrt();
        let pixdim: [f32; 8] = [1.0, voxel_size(0), voxel_size(1), voxel_size(2), 1.0, 1.0, 1.0, 1.0];
        for (i, &p) in pixdim.iter().enumerate() {
            let offset = 76 + i * 4;
            header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
        }

        header[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());
        // scl_slope = 1, scl_inter = 0
        header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
        header[116..120].copy_from_slice(&0.0f32.to_le_bytes());
        // sform_code = 1 (scanner anat)
        header[254..256].copy_from_slice(&1i16.to_le_bytes());

        for (row, base) in [280usize, 296, 312].iter().enumerate() {
            for col in 0..4 {
                let offset = base + col * 4;
                header[offset..offset + 4].copy_from_slice(&s[row][col].to_le_bytes());
            }
        }
        header[344..348].copy_from_slice(b"n+1\0");

        let mut buffer = Vec::with_capacity(VOX_OFFSET + frames * space.num_voxels() * 4);
        buffer.write_all(&header)?;
        // no extensions
        buffer.write_all(&[0u8; 4])?;
        for map in 0..frames {
            for k in 0..nz {
                for j in 0..ny {
                    for i in 0..nx {
                        buffer.write_all(&roi.value(map, [i, j, k]).to_le_bytes())?;
                    }
                }
            }
        }
        Ok(buffer)
    }

    /// Encode a volume ROI as gzipped NIfTI-1 (`.nii.gz`).
    fn encode_volume_roi_gz(roi: &VolumeRoi) -> Result<Vec<u8>> {
        let uncompressed = encode_volume_roi(roi)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&uncompressed)?;
        Ok(encoder.finish()?)
    }

    fn sample() -> VolumeRoi {
        let space = VolumeSpace::new(
            [3, 2, 2],
            [[2.0, 0.0, 0.0, -10.0], [0.0, 2.0, 0.0, 5.0], [0.0, 0.0, 2.0, 1.0]],
        );
        let values: Vec<f32> = (0..12).map(|v| if v % 3 == 0 { 1.0 } else { 0.0 }).collect();
        VolumeRoi::new(space, values).unwrap()
    }

    #[test]
    fn test_gzip_detection() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x00]));
        assert!(!is_gzip(&[0x00, 0x00, 0x00]));
        assert!(!is_gzip(&[0x1f])); // Too short
    }

    #[test]
    fn test_sform_falls_back_to_voxel_sizes() {
        let mut header = NiftiHeader::default();
        header.pixdim[1] = 1.0;
        header.pixdim[2] = 2.0;
        header.pixdim[3] = 3.0;
        header.sform_code = 0;

        let sform = sform_from_header(&header);
        assert_eq!(sform[0][0], 1.0);
        assert_eq!(sform[1][1], 2.0);
        assert_eq!(sform[2][2], 3.0);
        assert_eq!(sform[0][3], 0.0);
    }

    #[test]
    fn test_encoded_header() {
        let bytes = encode_volume_roi(&sample()).unwrap();
        assert_eq!(bytes.len(), VOX_OFFSET + 12 * 4);
        assert_eq!(&bytes[344..348], b"n+1\0");
        let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(sizeof_hdr, 348);
    }

    #[test]
    fn test_load_keeps_space_and_voxel_order() {
        let roi = sample();
        for bytes in [encode_volume_roi(&roi).unwrap(), encode_volume_roi_gz(&roi).unwrap()] {
            let loaded = load_volume_roi(&bytes).unwrap();
            assert_eq!(loaded.space().dims, [3, 2, 2]);
            assert!(loaded.space().matches(roi.space()));
            assert_eq!(loaded.num_maps(), 1);
            assert_eq!(loaded.value(0, [0, 0, 0]), 1.0);
            assert_eq!(loaded.value(0, [1, 0, 0]), 0.0);
            // linear offset 3 is (0, 1, 0)
            assert_eq!(loaded.value(0, [0, 1, 0]), 1.0);
        }
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(matches!(load_volume_roi(&[0u8; 16]), Err(CiftiError::Nifti(_))));
    }
}
