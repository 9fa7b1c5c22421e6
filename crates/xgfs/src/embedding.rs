//! Read-side of trained embeddings: a flat little-endian `f32` matrix with an
//! optional `row,label` index.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{Result, XgfsError};

#[derive(Debug, Clone)]
pub struct Embedding {
    dimensions: usize,
    values: Vec<f32>,
    index: AHashMap<String, usize>,
}

impl Embedding {
    pub fn load(path: &Path, dimensions: usize) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.len() % 4 != 0 {
            return Err(XgfsError::InvalidParameter(format!(
                "{} is {} bytes, not a whole number of f32 values",
                path.display(),
                bytes.len()
            )));
        }
        let mut values = vec![0f32; bytes.len() / 4];
        LittleEndian::read_f32_into(&bytes, &mut values);
        let embedding = Self::from_values(values, dimensions)?;
        debug!(
            path = %path.display(),
            rows = embedding.rows(),
            dimensions,
            "embedding loaded"
        );
        Ok(embedding)
    }

    pub fn from_values(values: Vec<f32>, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(XgfsError::InvalidParameter(
                "embedding dimensionality must be positive".to_string(),
            ));
        }
        if values.len() % dimensions != 0 {
            return Err(XgfsError::InvalidParameter(format!(
                "{} values cannot be split into rows of {}",
                values.len(),
                dimensions
            )));
        }
        Ok(Self {
            dimensions,
            values,
            index: AHashMap::new(),
        })
    }

    /// Attach the `row,label` index written by `convert --index`.
    pub fn with_index(self, path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        self.load_index(BufReader::new(file))
    }

    /// Each line is `row,label`, split at the first comma so labels may
    /// contain commas.
    pub fn load_index<R: BufRead>(mut self, reader: R) -> Result<Self> {
        let rows = self.rows();
        let mut index = AHashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (row, label) = line.split_once(',').ok_or_else(|| {
                XgfsError::format("index line must be 'row,label'").at_line(idx + 1, line)
            })?;
            let row: usize = row.trim().parse().map_err(|_| {
                XgfsError::format(format!("invalid row '{}'", row)).at_line(idx + 1, line)
            })?;
            if row >= rows {
                return Err(XgfsError::InvalidParameter(format!(
                    "index row {} out of range for {} embedding rows",
                    row, rows
                )));
            }
            index.insert(label.to_string(), row);
        }
        self.index = index;
        Ok(self)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn rows(&self) -> usize {
        self.values.len() / self.dimensions
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.dimensions)
    }

    pub fn has_index(&self) -> bool {
        !self.index.is_empty()
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimensions)?;
        self.values.get(start..start + self.dimensions)
    }

    pub fn get(&self, label: &str) -> Option<&[f32]> {
        self.index.get(label).and_then(|&row| self.row(row))
    }
}
