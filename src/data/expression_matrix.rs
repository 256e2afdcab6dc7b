//! Sparse cell-by-feature expression matrix.

use crate::error::{PerturbError, Result};
use sprs::{CsMat, TriMat};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const MTX_BANNER: &str = "%%MatrixMarket matrix coordinate real general";

/// A sparse expression matrix.
///
/// Rows represent cells, columns represent features (genes).
/// Uses CSR (Compressed Sparse Row) format so that selecting cells is a
/// row-wise operation.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    /// Sparse matrix in CSR format (cells × features)
    data: CsMat<f64>,
    /// Cell identifiers (row names)
    cell_ids: Vec<String>,
    /// Feature identifiers (column names)
    feature_ids: Vec<String>,
}

impl ExpressionMatrix {
    /// Create a new matrix from a sparse matrix and identifiers.
    pub fn new(data: CsMat<f64>, cell_ids: Vec<String>, feature_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != cell_ids.len() {
            return Err(PerturbError::DimensionMismatch {
                expected: nrows,
                actual: cell_ids.len(),
            });
        }
        if ncols != feature_ids.len() {
            return Err(PerturbError::DimensionMismatch {
                expected: ncols,
                actual: feature_ids.len(),
            });
        }
        Ok(Self {
            data,
            cell_ids,
            feature_ids,
        })
    }

    /// Build from (row, col, value) triplets. Zero values are not stored.
    pub fn from_triplets(
        triplets: &[(usize, usize, f64)],
        cell_ids: Vec<String>,
        feature_ids: Vec<String>,
    ) -> Result<Self> {
        let shape = (cell_ids.len(), feature_ids.len());
        let mut tri_mat = TriMat::new(shape);
        for &(row, col, val) in triplets {
            if row >= shape.0 || col >= shape.1 {
                return Err(PerturbError::InvalidParameter(format!(
                    "Entry ({}, {}) outside a {}x{} matrix",
                    row, col, shape.0, shape.1
                )));
            }
            if val != 0.0 {
                tri_mat.add_triplet(row, col, val);
            }
        }
        Self::new(tri_mat.to_csr(), cell_ids, feature_ids)
    }

    /// Load a dense matrix from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with feature IDs (first column is the cell ID header)
    /// - Subsequent rows: cell ID followed by values
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| PerturbError::EmptyData("Empty matrix TSV".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        let feature_ids: Vec<String> = header.iter().skip(1).map(|s| s.to_string()).collect();
        let n_features = feature_ids.len();

        let mut triplets = Vec::new();
        let mut cell_ids = Vec::new();
        for (line_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let row = cell_ids.len();
            cell_ids.push(fields[0].to_string());

            for (col, value_str) in fields.iter().skip(1).take(n_features).enumerate() {
                let value: f64 =
                    value_str
                        .trim()
                        .parse()
                        .map_err(|_| PerturbError::InvalidValue {
                            value: value_str.to_string(),
                            line: line_idx + 2,
                        })?;
                triplets.push((row, col, value));
            }
        }

        Self::from_triplets(&triplets, cell_ids, feature_ids)
    }

    /// Write the matrix to a dense TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "cell_id")?;
        for feature_id in &self.feature_ids {
            write!(writer, "\t{}", feature_id)?;
        }
        writeln!(writer)?;

        for (row, cell_id) in self.cell_ids.iter().enumerate() {
            write!(writer, "{}", cell_id)?;
            for value in self.row_dense(row) {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read MatrixMarket coordinate data. Dimensions must match the given identifiers.
    pub fn read_matrix_market<R: BufRead>(
        reader: R,
        cell_ids: Vec<String>,
        feature_ids: Vec<String>,
    ) -> Result<Self> {
        let mut lines = reader
            .lines()
            .enumerate()
            .map(|(idx, line)| line.map(|l| (idx + 1, l)));

        let mut size_line = None;
        for item in lines.by_ref() {
            let (line_no, line) = item?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('%') {
                continue;
            }
            size_line = Some((line_no, trimmed.to_string()));
            break;
        }
        let (line_no, size_line) = size_line
            .ok_or_else(|| PerturbError::InvalidFormat("matrix.mtx has no size line".to_string()))?;

        let sizes = parse_fields::<usize>(&size_line, line_no)?;
        if sizes.len() != 3 {
            return Err(PerturbError::InvalidFormat(format!(
                "Malformed MatrixMarket size line '{}'",
                size_line
            )));
        }
        let (n_rows, n_cols, nnz) = (sizes[0], sizes[1], sizes[2]);
        if n_rows != cell_ids.len() {
            return Err(PerturbError::DimensionMismatch {
                expected: cell_ids.len(),
                actual: n_rows,
            });
        }
        if n_cols != feature_ids.len() {
            return Err(PerturbError::DimensionMismatch {
                expected: feature_ids.len(),
                actual: n_cols,
            });
        }

        let mut triplets = Vec::with_capacity(nnz);
        for item in lines {
            let (line_no, line) = item?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('%') {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (Some(r), Some(c), Some(v)) = (fields.next(), fields.next(), fields.next()) else {
                return Err(PerturbError::InvalidValue {
                    value: trimmed.to_string(),
                    line: line_no,
                });
            };
            let row = parse_field::<usize>(r, line_no)?;
            let col = parse_field::<usize>(c, line_no)?;
            let value = parse_field::<f64>(v, line_no)?;
            if row == 0 || col == 0 {
                return Err(PerturbError::InvalidValue {
                    value: trimmed.to_string(),
                    line: line_no,
                });
            }
            triplets.push((row - 1, col - 1, value));
        }
        if triplets.len() != nnz {
            return Err(PerturbError::DimensionMismatch {
                expected: nnz,
                actual: triplets.len(),
            });
        }

        Self::from_triplets(&triplets, cell_ids, feature_ids)
    }

    /// Write MatrixMarket coordinate data (1-based indices).
    pub fn write_matrix_market<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{}", MTX_BANNER)?;
        writeln!(writer, "{} {} {}", self.n_cells(), self.n_features(), self.nnz())?;
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                writeln!(writer, "{} {} {}", row + 1, col + 1, val)?;
            }
        }
        Ok(())
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    /// Number of cells (rows).
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.data.rows()
    }

    /// Number of features (columns).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.data.cols()
    }

    /// Total number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.nnz()
    }

    #[inline]
    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<f64> {
        &self.data
    }

    /// Get a dense vector for a specific row (cell).
    pub fn row_dense(&self, row: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_features()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Keep only the cells at `indices`, in the given order.
    pub fn select_cells(&self, indices: &[usize]) -> Result<Self> {
        let n_cells = indices.len();
        let mut triplets = Vec::new();
        let mut new_cell_ids = Vec::with_capacity(n_cells);

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_cells() {
                return Err(PerturbError::InvalidParameter(format!(
                    "Cell index {} out of bounds",
                    old_row
                )));
            }
            new_cell_ids.push(self.cell_ids[old_row].clone());

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    triplets.push((new_row, col, val));
                }
            }
        }

        Self::from_triplets(&triplets, new_cell_ids, self.feature_ids.clone())
    }
}

fn parse_field<T: std::str::FromStr>(raw: &str, line: usize) -> Result<T> {
    raw.parse::<T>().map_err(|_| PerturbError::InvalidValue {
        value: raw.to_string(),
        line,
    })
}

fn parse_fields<T: std::str::FromStr>(raw: &str, line: usize) -> Result<Vec<T>> {
    raw.split_whitespace()
        .map(|field| parse_field(field, line))
        .collect()
}
