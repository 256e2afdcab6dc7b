//! Observation table paired with its expression matrix.

use crate::data::{ExpressionMatrix, ObsTable};
use crate::error::{PerturbError, Result};
use std::path::Path;

/// An observation table and a cells × features matrix whose rows describe
/// the same cells in the same order.
#[derive(Debug, Clone)]
pub struct AnnotatedMatrix {
    obs: ObsTable,
    matrix: ExpressionMatrix,
}

impl AnnotatedMatrix {
    /// Pair a table with a matrix, checking that their cell IDs line up.
    pub fn new(obs: ObsTable, matrix: ExpressionMatrix) -> Result<Self> {
        if obs.n_cells() != matrix.n_cells() {
            return Err(PerturbError::DimensionMismatch {
                expected: obs.n_cells(),
                actual: matrix.n_cells(),
            });
        }
        if let Some((row, (a, b))) = obs
            .cell_ids()
            .iter()
            .zip(matrix.cell_ids())
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(PerturbError::CellMismatch(format!(
                "row {}: observation table has '{}', matrix has '{}'",
                row, a, b
            )));
        }
        Ok(Self { obs, matrix })
    }

    /// Import an observation TSV and a dense cells × features matrix TSV.
    pub fn from_tsv<P: AsRef<Path>, Q: AsRef<Path>>(obs_path: P, matrix_path: Q) -> Result<Self> {
        let obs = ObsTable::from_tsv(obs_path)?;
        let matrix = ExpressionMatrix::from_tsv(matrix_path)?;
        Self::new(obs, matrix)
    }

    pub fn obs(&self) -> &ObsTable {
        &self.obs
    }

    pub fn matrix(&self) -> &ExpressionMatrix {
        &self.matrix
    }

    /// Number of cells.
    pub fn n_cells(&self) -> usize {
        self.obs.n_cells()
    }

    /// Number of features.
    pub fn n_features(&self) -> usize {
        self.matrix.n_features()
    }

    /// `(cells, features)`, in the same orientation as the matrix.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_cells(), self.n_features())
    }

    /// Select the same cells from both the table and the matrix.
    pub fn select_cells(&self, indices: &[usize]) -> Result<Self> {
        let obs = self.obs.select(indices)?;
        let matrix = self.matrix.select_cells(indices)?;
        Ok(Self { obs, matrix })
    }

    pub fn into_parts(self) -> (ObsTable, ExpressionMatrix) {
        (self.obs, self.matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ObsValue;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn create_test_adata() -> AnnotatedMatrix {
        let obs = ObsTable::new(ids(&["c1", "c2", "c3"]))
            .with_column(
                "perturbation",
                vec!["drugA".into(), "drugA,drugB".into(), "vehicle".into()],
            )
            .unwrap();
        let matrix = ExpressionMatrix::from_triplets(
            &[(0, 0, 1.0), (1, 1, 2.0), (2, 0, 3.0)],
            ids(&["c1", "c2", "c3"]),
            ids(&["g1", "g2"]),
        )
        .unwrap();
        AnnotatedMatrix::new(obs, matrix).unwrap()
    }

    #[test]
    fn test_shape() {
        let adata = create_test_adata();
        assert_eq!(adata.shape(), (3, 2));
    }

    #[test]
    fn test_cell_mismatch() {
        let obs = ObsTable::new(ids(&["c1", "c2"]));
        let matrix = ExpressionMatrix::from_triplets(&[], ids(&["c1", "cX"]), ids(&["g1"])).unwrap();
        assert!(matches!(
            AnnotatedMatrix::new(obs, matrix),
            Err(PerturbError::CellMismatch(_))
        ));
    }

    #[test]
    fn test_row_count_mismatch() {
        let obs = ObsTable::new(ids(&["c1"]));
        let matrix = ExpressionMatrix::from_triplets(&[], ids(&["c1", "c2"]), ids(&["g1"])).unwrap();
        assert!(matches!(
            AnnotatedMatrix::new(obs, matrix),
            Err(PerturbError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_select_keeps_rows_aligned() {
        let adata = create_test_adata();
        let subset = adata.select_cells(&[2, 0]).unwrap();

        assert_eq!(subset.obs().cell_ids(), subset.matrix().cell_ids());
        assert_eq!(subset.obs().cell_ids(), &["c3", "c1"]);
        assert_eq!(subset.obs().get(0, "perturbation"), Some(&ObsValue::from("vehicle")));
        assert_eq!(subset.matrix().row_dense(0), vec![3.0, 0.0]);
        assert_eq!(subset.matrix().row_dense(1), vec![1.0, 0.0]);
    }
}
