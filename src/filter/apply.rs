//! Splitting cells into kept and removed sets.

use crate::data::{AnnotatedMatrix, ObsTable};
use crate::error::{PerturbError, Result};
use crate::filter::separator::{detect_separators, RemovalMask, SeparatorSet};
use log::info;
use serde::{Deserialize, Serialize};

/// Row indices of the two sides of a mask, each in original order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    /// Rows where the mask is false.
    pub kept: Vec<usize>,
    /// Rows where the mask is true.
    pub removed: Vec<usize>,
}

/// Split row indices by a removal mask.
pub fn partition(mask: &RemovalMask) -> Partition {
    let mut result = Partition::default();
    for (idx, &remove) in mask.as_slice().iter().enumerate() {
        if remove {
            result.removed.push(idx);
        } else {
            result.kept.push(idx);
        }
    }
    result
}

fn check_mask_len(mask: &RemovalMask, n_cells: usize) -> Result<()> {
    if mask.len() != n_cells {
        return Err(PerturbError::DimensionMismatch {
            expected: n_cells,
            actual: mask.len(),
        });
    }
    Ok(())
}

/// Split an observation table into `(kept, removed)` by a removal mask.
pub fn split_obs(obs: &ObsTable, mask: &RemovalMask) -> Result<(ObsTable, ObsTable)> {
    check_mask_len(mask, obs.n_cells())?;
    let parts = partition(mask);
    Ok((obs.select(&parts.kept)?, obs.select(&parts.removed)?))
}

/// Split an annotated matrix into `(kept, removed)`.
///
/// Each side selects the same rows from the table and the matrix together.
/// A mask with nothing flagged returns the input unchanged as the kept side.
pub fn split_annotated(
    adata: &AnnotatedMatrix,
    mask: &RemovalMask,
) -> Result<(AnnotatedMatrix, AnnotatedMatrix)> {
    check_mask_len(mask, adata.n_cells())?;
    let parts = partition(mask);
    let kept = if parts.removed.is_empty() {
        adata.clone()
    } else {
        adata.select_cells(&parts.kept)?
    };
    let removed = adata.select_cells(&parts.removed)?;
    Ok((kept, removed))
}

/// Counts describing one filtering pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSummary {
    /// Column the separators were searched in.
    pub column: String,
    /// Separators used.
    pub separators: Vec<String>,
    /// Number of cells before filtering.
    pub n_before: usize,
    /// Number of cells removed.
    pub n_removed: usize,
    /// Number of cells after filtering.
    pub n_after: usize,
    /// Proportion of cells retained.
    pub retention_rate: f64,
}

impl FilterSummary {
    fn new(column: &str, separators: &SeparatorSet, mask: &RemovalMask) -> Self {
        let n_before = mask.len();
        let n_removed = mask.n_removed();
        let n_after = n_before - n_removed;
        Self {
            column: column.to_string(),
            separators: separators.as_slice().to_vec(),
            n_before,
            n_removed,
            n_after,
            retention_rate: if n_before == 0 {
                1.0
            } else {
                n_after as f64 / n_before as f64
            },
        }
    }

    /// True when no cell was removed.
    pub fn is_unchanged(&self) -> bool {
        self.n_removed == 0
    }
}

impl std::fmt::Display for FilterSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Filter Result")?;
        writeln!(f, "  Column:    {}", self.column)?;
        writeln!(f, "  Separators: {:?}", self.separators)?;
        writeln!(f, "  Before:    {} cells", self.n_before)?;
        writeln!(f, "  Removed:   {} cells", self.n_removed)?;
        writeln!(f, "  After:     {} cells", self.n_after)?;
        writeln!(f, "  Retained:  {:.1}%", self.retention_rate * 100.0)?;
        Ok(())
    }
}

/// Result of removing multi-perturbation cells.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub kept: AnnotatedMatrix,
    pub removed: AnnotatedMatrix,
    pub summary: FilterSummary,
}

/// Remove cells whose `column` label contains any of `separators`.
pub fn filter_multi_perturbations(
    adata: &AnnotatedMatrix,
    column: &str,
    separators: &SeparatorSet,
) -> Result<FilterOutcome> {
    info!(
        "Identifying cells where '{}' contains any of {}",
        column, separators
    );
    let mask = detect_separators(adata.obs(), column, separators)?;
    let summary = FilterSummary::new(column, separators, &mask);
    if summary.is_unchanged() {
        info!("Found 0 cells containing separators; no filtering needed");
    } else {
        info!(
            "Found {} cells containing separators; these will be removed",
            summary.n_removed
        );
    }

    let (kept, removed) = split_annotated(adata, &mask)?;
    Ok(FilterOutcome {
        kept,
        removed,
        summary,
    })
}
