//! Counting cells per perturbation and dose.

use crate::data::ObsTable;
use crate::dose::DoseFrequencyTable;
use crate::error::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved perturbation label for untreated cells.
pub const DEFAULT_CONTROL_LABEL: &str = "vehicle";

/// Column names and control label used by [`aggregate_doses`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseOptions {
    pub perturbation_column: String,
    pub dose_column: String,
    /// Compared case-insensitively against the perturbation label.
    pub control_label: String,
}

impl Default for DoseOptions {
    fn default() -> Self {
        Self {
            perturbation_column: "perturbation".to_string(),
            dose_column: "dose_value".to_string(),
            control_label: DEFAULT_CONTROL_LABEL.to_string(),
        }
    }
}

/// A frequency table together with the rows left out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseAggregation {
    pub table: DoseFrequencyTable,
    /// Rows in the input table.
    pub n_input: usize,
    /// Rows labelled with the control label.
    pub n_control: usize,
    /// Rows without a perturbation label.
    pub n_missing_label: usize,
    /// Rows whose dose could not be read as a number.
    pub n_invalid_dose: usize,
}

impl DoseAggregation {
    /// Rows counted in the table.
    pub fn n_aggregated(&self) -> usize {
        self.n_input - self.n_control - self.n_missing_label - self.n_invalid_dose
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl fmt::Display for DoseAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dose Aggregation")?;
        writeln!(f, "  Input cells:        {}", self.n_input)?;
        writeln!(f, "  Control cells:      {}", self.n_control)?;
        writeln!(f, "  Missing label:      {}", self.n_missing_label)?;
        writeln!(f, "  Non-numeric dose:   {}", self.n_invalid_dose)?;
        writeln!(f, "  Aggregated cells:   {}", self.n_aggregated())?;
        writeln!(f, "  Perturbations:      {}", self.table.n_perturbations())?;
        writeln!(f, "  Distinct doses:     {}", self.table.n_doses())?;
        Ok(())
    }
}

/// Build the perturbation × dose frequency table from an observation table.
///
/// Control rows (case-insensitive match on the control label) and rows
/// without a label are excluded first; rows whose dose is not a finite
/// number are then dropped and counted, never binned.
///
/// This is stricter than plain numeric coercion: `"inf"` and values that
/// overflow to infinity (such as `1e400`) count as invalid doses too.
pub fn aggregate_doses(obs: &ObsTable, opts: &DoseOptions) -> Result<DoseAggregation> {
    let labels = obs.column(&opts.perturbation_column)?;
    let doses = obs.column(&opts.dose_column)?;
    let control = opts.control_label.to_lowercase();

    let mut n_control = 0;
    let mut n_missing_label = 0;
    let mut n_invalid_dose = 0;
    let mut pairs = Vec::with_capacity(obs.n_cells());

    for (label, dose) in labels.iter().zip(doses) {
        let Some(label) = label.as_text() else {
            n_missing_label += 1;
            continue;
        };
        if label.to_lowercase() == control {
            n_control += 1;
            continue;
        }
        match dose.as_numeric() {
            Some(dose) => pairs.push((label, dose)),
            None => n_invalid_dose += 1,
        }
    }

    if n_invalid_dose > 0 {
        warn!(
            "{} rows had non-numeric dose values and were excluded",
            n_invalid_dose
        );
    }
    if n_missing_label > 0 {
        warn!(
            "{} rows had no '{}' value and were excluded",
            n_missing_label, opts.perturbation_column
        );
    }

    let table = DoseFrequencyTable::from_pairs(pairs);
    info!(
        "Tabulated {} perturbations x {} doses",
        table.n_perturbations(),
        table.n_doses()
    );

    Ok(DoseAggregation {
        table,
        n_input: obs.n_cells(),
        n_control,
        n_missing_label,
        n_invalid_dose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ObsValue;
    use crate::error::PerturbError;

    fn create_test_obs(rows: Vec<(ObsValue, ObsValue)>) -> ObsTable {
        let cell_ids = (0..rows.len()).map(|i| format!("cell_{}", i)).collect();
        let (labels, doses): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        ObsTable::new(cell_ids)
            .with_column("perturbation", labels)
            .unwrap()
            .with_column("dose_value", doses)
            .unwrap()
    }

    fn row(label: &str, dose: f64) -> (ObsValue, ObsValue) {
        (label.into(), ObsValue::Number(dose))
    }

    #[test]
    fn test_basic_counts() {
        let obs = create_test_obs(vec![row("drugA", 1.0), row("drugA", 1.0), row("drugA", 2.0)]);
        let agg = aggregate_doses(&obs, &DoseOptions::default()).unwrap();

        assert_eq!(agg.table.row("drugA"), Some(&[2, 1][..]));
        assert_eq!(agg.table.most_common_doses(), vec![("drugA".to_string(), 1.0)]);
        assert_eq!(agg.n_aggregated(), 3);
    }

    #[test]
    fn test_control_excluded_case_insensitive() {
        let obs = create_test_obs(vec![
            row("Vehicle", 0.0),
            row("VEHICLE", 0.0),
            row("vehicle", 0.0),
            row("vehicle_dmso", 0.0),
            row("drugA", 10.0),
        ]);
        let agg = aggregate_doses(&obs, &DoseOptions::default()).unwrap();

        assert_eq!(agg.n_control, 3);
        assert_eq!(agg.table.perturbations(), &["drugA", "vehicle_dmso"]);
        assert_eq!(agg.table.total(), 2);
    }

    #[test]
    fn test_non_numeric_dose_is_dropped_and_counted() {
        let obs = create_test_obs(vec![
            ("drugA".into(), "1".into()),
            ("drugA".into(), "N/A".into()),
            ("drugA".into(), ObsValue::Missing),
            ("drugB".into(), " 0.5 ".into()),
            ("vehicle".into(), "N/A".into()),
        ]);
        let agg = aggregate_doses(&obs, &DoseOptions::default()).unwrap();

        assert_eq!(agg.n_invalid_dose, 2);
        assert_eq!(agg.n_control, 1);
        assert_eq!(agg.table.doses(), &[0.5, 1.0]);
        assert_eq!(agg.table.get("drugA", 0.0), 0);
        assert_eq!(agg.table.total(), 2);
    }

    #[test]
    fn test_infinite_doses_are_invalid() {
        let obs = create_test_obs(vec![
            ("drugA".into(), "inf".into()),
            ("drugA".into(), "1e400".into()),
            ("drugA".into(), "-inf".into()),
            ("drugA".into(), "1e3".into()),
        ]);
        let agg = aggregate_doses(&obs, &DoseOptions::default()).unwrap();

        assert_eq!(agg.n_invalid_dose, 3);
        assert_eq!(agg.table.doses(), &[1000.0]);
        assert_eq!(agg.table.total(), 1);
    }

    #[test]
    fn test_total_matches_valid_rows() {
        let obs = create_test_obs(vec![
            row("drugA", 1.0),
            row("drugB", 2.0),
            row("vehicle", 0.0),
            ("drugC".into(), "abc".into()),
            (ObsValue::Missing, ObsValue::Number(3.0)),
            row("drugA", 2.0),
        ]);
        let agg = aggregate_doses(&obs, &DoseOptions::default()).unwrap();

        assert_eq!(agg.n_missing_label, 1);
        assert_eq!(agg.table.total() as usize, agg.n_aggregated());
        assert_eq!(agg.n_aggregated(), 3);
        assert_eq!(agg.table.row_totals().iter().sum::<u64>(), agg.table.total());
        assert_eq!(agg.table.col_totals().iter().sum::<u64>(), agg.table.total());
    }

    #[test]
    fn test_only_controls_gives_empty_table() {
        let obs = create_test_obs(vec![row("vehicle", 0.0)]);
        let agg = aggregate_doses(&obs, &DoseOptions::default()).unwrap();
        assert!(agg.is_empty());
        assert_eq!(agg.n_aggregated(), 0);
    }

    #[test]
    fn test_missing_dose_column() {
        let obs = ObsTable::new(vec!["c1".to_string()])
            .with_column("perturbation", vec!["drugA".into()])
            .unwrap();
        let result = aggregate_doses(&obs, &DoseOptions::default());
        assert!(matches!(result, Err(PerturbError::MissingColumn(c)) if c == "dose_value"));
    }

    #[test]
    fn test_custom_columns_and_control() {
        let obs = ObsTable::new(vec!["c1".to_string(), "c2".to_string()])
            .with_column("treatment", vec!["DMSO".into(), "drugA".into()])
            .unwrap()
            .with_column("dose", vec![ObsValue::Number(0.0), ObsValue::Number(5.0)])
            .unwrap();
        let opts = DoseOptions {
            perturbation_column: "treatment".to_string(),
            dose_column: "dose".to_string(),
            control_label: "dmso".to_string(),
        };
        let agg = aggregate_doses(&obs, &opts).unwrap();
        assert_eq!(agg.n_control, 1);
        assert_eq!(agg.table.perturbations(), &["drugA"]);
    }
}
