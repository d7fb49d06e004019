//! On-disk dense matrix container
//!
//! Layout (all integers little-endian):
//!
//! | bytes | content |
//! |-------|---------|
//! | 8     | magic `CIFTIMAT` |
//! | 4     | format version (`u32`) |
//! | 8     | header length `n` (`u64`) |
//! | n     | JSON-serialized `CiftiXml` |
//! | rows * cols * 4 | row-major `f32` values |
//!
//! `DenseFile` serves positioned whole-row reads. `DenseFileWriter` writes
//! into a temporary file next to the target and renames it into place on
//! `finish`; dropping an unfinished writer leaves no output behind.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::cifti::CiftiXml;
use crate::error::{CiftiError, Result};
use crate::matrix::{CiftiSink, InMemoryMatrix, RowMatrix};

pub const MAGIC: &[u8; 8] = b"CIFTIMAT";
pub const FORMAT_VERSION: u32 = 1;

const PREAMBLE_LEN: u64 = 8 + 4 + 8;

fn row_bytes(num_cols: usize) -> u64 {
    (num_cols * std::mem::size_of::<f32>()) as u64
}

// ============================================================================
// Reader
// ============================================================================

/// Dense matrix file opened for row reads.
#[derive(Debug)]
pub struct DenseFile {
    path: PathBuf,
    xml: CiftiXml,
    data_offset: u64,
    file: Mutex<File>,
}

impl DenseFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(CiftiError::Format(format!("{} is not a dense matrix file", path.display())));
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(CiftiError::Format(format!("unsupported format version {}", version)));
        }
        let header_len = file.read_u64::<LittleEndian>()?;
        let file_len = file.metadata()?.len();
        if header_len > file_len.saturating_sub(PREAMBLE_LEN) {
            return Err(CiftiError::Format(format!(
                "{} header length {} exceeds file size {}",
                path.display(),
                header_len,
                file_len
            )));
        }
        let mut header = vec![0u8; header_len as usize];
        file.read_exact(&mut header)?;
        let xml: CiftiXml = serde_json::from_slice(&header)?;

        let data_offset = PREAMBLE_LEN + header_len;
        let expected = data_offset + xml.num_rows() as u64 * row_bytes(xml.num_cols());
        let actual = file_len;
        if actual < expected {
            return Err(CiftiError::Format(format!(
                "{} is truncated: expected {} bytes, found {}",
                path.display(),
                expected,
                actual
            )));
        }
        debug!(
            "opened {} ({} rows x {} columns)",
            path.display(),
            xml.num_rows(),
            xml.num_cols()
        );

        Ok(Self {
            path,
            xml,
            data_offset,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row into a resident matrix.
    pub fn to_in_memory(&self) -> Result<InMemoryMatrix> {
        let num_cols = self.num_cols();
        let mut data = vec![0.0f32; self.num_rows() * num_cols];
        if num_cols > 0 {
            for (row, chunk) in data.chunks_mut(num_cols).enumerate() {
                self.read_row(row, chunk)?;
            }
        }
        InMemoryMatrix::from_data(self.xml.clone(), data)
    }
}

impl RowMatrix for DenseFile {
    fn cifti_xml(&self) -> &CiftiXml {
        &self.xml
    }

    fn is_in_memory(&self) -> bool {
        false
    }

    fn read_row(&self, row: usize, out: &mut [f32]) -> Result<()> {
        let num_rows = self.num_rows();
        if row >= num_rows {
            return Err(CiftiError::InvalidIndex { index: row, length: num_rows });
        }
        if out.len() != self.num_cols() {
            return Err(CiftiError::RowLengthMismatch {
                expected: self.num_cols(),
                actual: out.len(),
            });
        }
        let mut bytes = vec![0u8; row_bytes(out.len()) as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.data_offset + row as u64 * row_bytes(out.len())))?;
            file.read_exact(&mut bytes)?;
        }
        LittleEndian::read_f32_into(&bytes, out);
        Ok(())
    }
}

// ============================================================================
// Writer
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Layout {
    data_offset: u64,
    num_rows: usize,
    num_cols: usize,
}

/// Atomic writer for a dense matrix file.
#[derive(Debug)]
pub struct DenseFileWriter {
    path: PathBuf,
    file: NamedTempFile,
    layout: Option<Layout>,
    scratch: Vec<u8>,
}

impl DenseFileWriter {
    /// Start a new output at `path`. Nothing appears at `path` until `finish`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file = NamedTempFile::new_in(dir)?;
        Ok(Self {
            path,
            file,
            layout: None,
            scratch: Vec::new(),
        })
    }

    /// Flush and move the finished file into place.
    pub fn finish(mut self) -> Result<()> {
        if self.layout.is_none() {
            return Err(CiftiError::Format("no header was written".to_string()));
        }
        self.file.as_file_mut().flush()?;
        self.file.as_file().sync_all()?;
        self.file.persist(&self.path).map_err(|e| CiftiError::Io(e.error))?;
        debug!("wrote {}", self.path.display());
        Ok(())
    }
}

impl CiftiSink for DenseFileWriter {
    fn set_cifti_xml(&mut self, xml: CiftiXml) -> Result<()> {
        if self.layout.is_some() {
            return Err(CiftiError::Format("header already written".to_string()));
        }
        let header = serde_json::to_vec(&xml)?;
        let file = self.file.as_file_mut();
        file.write_all(MAGIC)?;
        file.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        file.write_u64::<LittleEndian>(header.len() as u64)?;
        file.write_all(&header)?;

        let layout = Layout {
            data_offset: PREAMBLE_LEN + header.len() as u64,
            num_rows: xml.num_rows(),
            num_cols: xml.num_cols(),
        };
        // rows never written read back as zeros
        file.set_len(layout.data_offset + layout.num_rows as u64 * row_bytes(layout.num_cols))?;
        self.layout = Some(layout);
        Ok(())
    }

    fn set_row(&mut self, row: usize, data: &[f32]) -> Result<()> {
        let layout = self
            .layout
            .ok_or_else(|| CiftiError::Format("header must be written before rows".to_string()))?;
        if row >= layout.num_rows {
            return Err(CiftiError::InvalidIndex {
                index: row,
                length: layout.num_rows,
            });
        }
        if data.len() != layout.num_cols {
            return Err(CiftiError::RowLengthMismatch {
                expected: layout.num_cols,
                actual: data.len(),
            });
        }
        self.scratch.resize(row_bytes(data.len()) as usize, 0);
        LittleEndian::write_f32_into(data, &mut self.scratch);
        let file = self.file.as_file_mut();
        file.seek(SeekFrom::Start(layout.data_offset + row as u64 * row_bytes(layout.num_cols)))?;
        file.write_all(&self.scratch)?;
        Ok(())
    }
}

/// Read a whole dense file into memory.
pub fn read_dense_file(path: impl AsRef<Path>) -> Result<InMemoryMatrix> {
    DenseFile::open(path)?.to_in_memory()
}

/// Write any row matrix to `path` atomically.
pub fn write_dense_file(path: impl AsRef<Path>, matrix: &dyn RowMatrix) -> Result<()> {
    let mut writer = DenseFileWriter::create(path)?;
    writer.set_cifti_xml(matrix.cifti_xml().clone())?;
    let mut row = vec![0.0f32; matrix.num_cols()];
    for i in 0..matrix.num_rows() {
        matrix.read_row(i, &mut row)?;
        writer.set_row(i, &row)?;
    }
    writer.finish()
}
