//! Fully resident matrix.

use crate::cifti::{BrainModelsMap, CiftiXml, IndexMap, ScalarsMap, Structure};
use crate::error::{CiftiError, Result};
use crate::matrix::{CiftiSink, RowMatrix};

/// Row-major `f32` matrix held entirely in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryMatrix {
    xml: CiftiXml,
    data: Vec<f32>,
}

impl InMemoryMatrix {
    /// Zero-filled matrix shaped by `xml`.
    pub fn zeros(xml: CiftiXml) -> Self {
        let len = xml.num_rows() * xml.num_cols();
        Self { xml, data: vec![0.0; len] }
    }

    /// Matrix from row-major data. `data.len()` must equal rows * columns.
    pub fn from_data(xml: CiftiXml, data: Vec<f32>) -> Result<Self> {
        let expected = xml.num_rows() * xml.num_cols();
        if data.len() != expected {
            return Err(CiftiError::RowLengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { xml, data })
    }

    /// Matrix from explicit rows.
    pub fn from_rows(xml: CiftiXml, rows: &[Vec<f32>]) -> Result<Self> {
        if rows.len() != xml.num_rows() {
            return Err(CiftiError::InvalidIndex {
                index: rows.len(),
                length: xml.num_rows(),
            });
        }
        let num_cols = xml.num_cols();
        let mut data = Vec::with_capacity(rows.len() * num_cols);
        for row in rows {
            if row.len() != num_cols {
                return Err(CiftiError::RowLengthMismatch {
                    expected: num_cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { xml, data })
    }

    /// Dense matrix whose rows are the vertices of one full `CORTEX_LEFT`
    /// surface and whose columns are unnamed scalar maps.
    pub fn dense_surface(rows: &[Vec<f32>]) -> Result<Self> {
        let num_cols = rows.first().map_or(0, Vec::len);
        let models = BrainModelsMap::new().with_surface_model(Structure::CortexLeft, rows.len(), None)?;
        let xml = CiftiXml::new(
            IndexMap::BrainModels(models),
            IndexMap::Scalars(ScalarsMap::with_count(num_cols)),
        );
        Self::from_rows(xml, rows)
    }

    pub fn row(&self, row: usize) -> Result<&[f32]> {
        let num_cols = self.xml.num_cols();
        let num_rows = self.xml.num_rows();
        if row >= num_rows {
            return Err(CiftiError::InvalidIndex { index: row, length: num_rows });
        }
        Ok(&self.data[row * num_cols..(row + 1) * num_cols])
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Rows as owned vectors, convenient for comparisons.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        let num_cols = self.xml.num_cols();
        if num_cols == 0 {
            return vec![Vec::new(); self.xml.num_rows()];
        }
        self.data.chunks(num_cols).map(<[f32]>::to_vec).collect()
    }
}

impl RowMatrix for InMemoryMatrix {
    fn cifti_xml(&self) -> &CiftiXml {
        &self.xml
    }

    fn is_in_memory(&self) -> bool {
        true
    }

    fn read_row(&self, row: usize, out: &mut [f32]) -> Result<()> {
        let src = self.row(row)?;
        if out.len() != src.len() {
            return Err(CiftiError::RowLengthMismatch {
                expected: src.len(),
                actual: out.len(),
            });
        }
        out.copy_from_slice(src);
        Ok(())
    }
}

impl CiftiSink for InMemoryMatrix {
    fn set_cifti_xml(&mut self, xml: CiftiXml) -> Result<()> {
        *self = InMemoryMatrix::zeros(xml);
        Ok(())
    }

    fn set_row(&mut self, row: usize, data: &[f32]) -> Result<()> {
        let num_cols = self.xml.num_cols();
        let num_rows = self.xml.num_rows();
        if row >= num_rows {
            return Err(CiftiError::InvalidIndex { index: row, length: num_rows });
        }
        if data.len() != num_cols {
            return Err(CiftiError::RowLengthMismatch {
                expected: num_cols,
                actual: data.len(),
            });
        }
        self.data[row * num_cols..(row + 1) * num_cols].copy_from_slice(data);
        Ok(())
    }
}

impl Default for InMemoryMatrix {
    fn default() -> Self {
        InMemoryMatrix::zeros(CiftiXml::new(
            IndexMap::Scalars(ScalarsMap::default()),
            IndexMap::Scalars(ScalarsMap::default()),
        ))
    }
}
