//! Perturbation × dose frequency table.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Finite dose usable as an ordered map key.
#[derive(Debug, Clone, Copy)]
struct DoseKey(f64);

impl DoseKey {
    fn new(dose: f64) -> Self {
        // fold -0.0 into 0.0
        Self(dose + 0.0)
    }
}

impl PartialEq for DoseKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DoseKey {}

impl PartialOrd for DoseKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DoseKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Cell counts per (perturbation, dose) pair.
///
/// Rows are perturbation labels in lexicographic order, columns are doses in
/// ascending numeric order. Pairs never observed count as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseFrequencyTable {
    perturbations: Vec<String>,
    doses: Vec<f64>,
    counts: Vec<Vec<u64>>,
}

impl DoseFrequencyTable {
    /// Count (perturbation, dose) pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut grouped: BTreeMap<String, BTreeMap<DoseKey, u64>> = BTreeMap::new();
        let mut all_doses: BTreeSet<DoseKey> = BTreeSet::new();
        for (label, dose) in pairs {
            let key = DoseKey::new(dose);
            all_doses.insert(key);
            *grouped.entry(label.into()).or_default().entry(key).or_insert(0) += 1;
        }

        let doses: Vec<DoseKey> = all_doses.into_iter().collect();
        let mut perturbations = Vec::with_capacity(grouped.len());
        let mut counts = Vec::with_capacity(grouped.len());
        for (label, by_dose) in grouped {
            counts.push(
                doses
                    .iter()
                    .map(|d| by_dose.get(d).copied().unwrap_or(0))
                    .collect(),
            );
            perturbations.push(label);
        }

        Self {
            perturbations,
            doses: doses.into_iter().map(|d| d.0).collect(),
            counts,
        }
    }

    /// Perturbation labels (row keys).
    pub fn perturbations(&self) -> &[String] {
        &self.perturbations
    }

    /// Doses (column keys), ascending.
    pub fn doses(&self) -> &[f64] {
        &self.doses
    }

    /// Count matrix, one row per perturbation.
    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn n_perturbations(&self) -> usize {
        self.perturbations.len()
    }

    pub fn n_doses(&self) -> usize {
        self.doses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perturbations.is_empty()
    }

    /// Counts for one perturbation, aligned with [`doses`](Self::doses).
    pub fn row(&self, perturbation: &str) -> Option<&[u64]> {
        self.perturbations
            .iter()
            .position(|p| p == perturbation)
            .map(|i| self.counts[i].as_slice())
    }

    /// Count for a (perturbation, dose) pair; zero when absent.
    pub fn get(&self, perturbation: &str, dose: f64) -> u64 {
        let key = DoseKey::new(dose);
        let Some(row) = self.row(perturbation) else {
            return 0;
        };
        self.doses
            .iter()
            .position(|&d| DoseKey::new(d) == key)
            .map(|col| row[col])
            .unwrap_or(0)
    }

    /// Cells per perturbation.
    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Cells per dose.
    pub fn col_totals(&self) -> Vec<u64> {
        let mut totals = vec![0u64; self.n_doses()];
        for row in &self.counts {
            for (total, &count) in totals.iter_mut().zip(row) {
                *total += count;
            }
        }
        totals
    }

    /// Total number of cells in the table.
    pub fn total(&self) -> u64 {
        self.row_totals().iter().sum()
    }

    /// Most frequent dose per perturbation.
    ///
    /// Ties go to the lowest dose, i.e. the first column in sorted order.
    pub fn most_common_doses(&self) -> Vec<(String, f64)> {
        self.perturbations
            .iter()
            .zip(&self.counts)
            .filter_map(|(label, row)| {
                let mut best: Option<(usize, u64)> = None;
                for (col, &count) in row.iter().enumerate() {
                    if best.map_or(true, |(_, max)| count > max) {
                        best = Some((col, count));
                    }
                }
                best.map(|(col, _)| (label.clone(), self.doses[col]))
            })
            .collect()
    }

    /// `ln(1 + count)` for every cell, for colour scaling.
    pub fn log1p(&self) -> Vec<Vec<f64>> {
        self.counts
            .iter()
            .map(|row| row.iter().map(|&c| (c as f64).ln_1p()).collect())
            .collect()
    }

    /// The first `n` perturbations; dose columns are unchanged.
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.n_perturbations());
        Self {
            perturbations: self.perturbations[..n].to_vec(),
            doses: self.doses.clone(),
            counts: self.counts[..n].to_vec(),
        }
    }

    /// The `n` perturbations with the most cells, in descending order of total.
    ///
    /// Equal totals keep their label order.
    pub fn top_by_total(&self, n: usize) -> Self {
        let totals = self.row_totals();
        let mut order: Vec<usize> = (0..self.n_perturbations()).collect();
        order.sort_by(|&a, &b| totals[b].cmp(&totals[a]));
        order.truncate(n);
        Self {
            perturbations: order.iter().map(|&i| self.perturbations[i].clone()).collect(),
            doses: self.doses.clone(),
            counts: order.iter().map(|&i| self.counts[i].clone()).collect(),
        }
    }

    /// Write the table as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "perturbation")?;
        for dose in &self.doses {
            write!(writer, "\t{}", dose)?;
        }
        writeln!(writer)?;

        for (label, row) in self.perturbations.iter().zip(&self.counts) {
            write!(writer, "{}", label)?;
            for count in row {
                write!(writer, "\t{}", count)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for DoseFrequencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = "perturbation";
        let label_width = self
            .perturbations
            .iter()
            .map(|p| p.chars().count())
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);
        let dose_labels: Vec<String> = self.doses.iter().map(|d| d.to_string()).collect();
        let col_widths: Vec<usize> = dose_labels
            .iter()
            .enumerate()
            .map(|(col, label)| {
                self.counts
                    .iter()
                    .map(|row| row[col].to_string().len())
                    .chain(std::iter::once(label.len()))
                    .max()
                    .unwrap_or(1)
            })
            .collect();

        write!(f, "{:<width$}", header, width = label_width)?;
        for (label, width) in dose_labels.iter().zip(&col_widths) {
            write!(f, "  {:>width$}", label, width = width)?;
        }
        writeln!(f)?;

        for (label, row) in self.perturbations.iter().zip(&self.counts) {
            write!(f, "{:<width$}", label, width = label_width)?;
            for (count, width) in row.iter().zip(&col_widths) {
                write!(f, "  {:>width$}", count, width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
