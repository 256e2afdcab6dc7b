//! Per-cell observation table.

use crate::error::{PerturbError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Tokens read as missing values.
const MISSING_TOKENS: [&str; 5] = ["", "NA", "na", "NaN", "nan"];

/// A single observation value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObsValue {
    /// Free text (labels, identifiers).
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Missing value.
    Missing,
}

impl ObsValue {
    /// Parse a raw field. Missing tokens become `Missing`, everything else is text.
    pub fn parse(raw: &str) -> Self {
        if is_missing_token(raw) {
            ObsValue::Missing
        } else {
            ObsValue::Text(raw.to_string())
        }
    }

    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, ObsValue::Missing)
    }

    /// Coerce to text. Numbers use their shortest round-trip form (`1.0` -> `"1"`).
    ///
    /// Whole numbers carry no decimal point, so a `"."` separator never
    /// matches a numeric label.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ObsValue::Text(s) => Some(s.clone()),
            ObsValue::Number(v) => Some(v.to_string()),
            ObsValue::Missing => None,
        }
    }

    /// Coerce to a finite number, if possible.
    ///
    /// Text is trimmed before parsing. Unparsable text, NaN, infinities and
    /// missing values yield `None`.
    pub fn as_numeric(&self) -> Option<f64> {
        let value = match self {
            ObsValue::Number(v) => *v,
            ObsValue::Text(s) => s.trim().parse::<f64>().ok()?,
            ObsValue::Missing => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Render for TSV output.
    fn to_field(&self) -> String {
        self.as_text().unwrap_or_default()
    }
}

impl From<&str> for ObsValue {
    fn from(s: &str) -> Self {
        ObsValue::Text(s.to_string())
    }
}

impl From<f64> for ObsValue {
    fn from(v: f64) -> Self {
        ObsValue::Number(v)
    }
}

impl<T: Into<ObsValue>> From<Option<T>> for ObsValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ObsValue::Missing)
    }
}

/// Inferred storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Numeric,
}

fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw.trim())
}

/// Stored type of one column, enough to read it back without guessing.
///
/// Missing values are written as empty fields, so text columns also list
/// the rows holding an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub empty_text_rows: Vec<usize>,
}

/// Header names, cell IDs and raw fields of a TSV observation table.
struct RawTable {
    column_names: Vec<String>,
    cell_ids: Vec<String>,
    columns: Vec<Vec<String>>,
}

impl RawTable {
    fn read<R: Read>(reader: R, skip_blank_rows: bool) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let header = rdr.headers()?.clone();
        if header.is_empty() {
            return Err(PerturbError::EmptyData(
                "Observation table has no header".to_string(),
            ));
        }
        let column_names: Vec<String> = header.iter().skip(1).map(String::from).collect();

        let mut cell_ids = Vec::new();
        let mut columns: Vec<Vec<String>> = vec![Vec::new(); column_names.len()];
        for record in rdr.records() {
            let record = record?;
            if skip_blank_rows && record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            cell_ids.push(record.get(0).unwrap_or_default().to_string());
            for (col_idx, column) in columns.iter_mut().enumerate() {
                column.push(record.get(col_idx + 1).unwrap_or_default().to_string());
            }
        }
        Ok(Self {
            column_names,
            cell_ids,
            columns,
        })
    }
}

/// Observation table: one row per cell, named columns of [`ObsValue`].
///
/// Row order is significant and is kept aligned with the rows of the paired
/// expression matrix. Values are stored column-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ObsTable {
    cell_ids: Vec<String>,
    column_names: Vec<String>,
    columns: Vec<Vec<ObsValue>>,
    column_types: Vec<ColumnType>,
}

impl ObsTable {
    /// Create a table with the given cells and no columns.
    pub fn new(cell_ids: Vec<String>) -> Self {
        Self {
            cell_ids,
            column_names: Vec::new(),
            columns: Vec::new(),
            column_types: Vec::new(),
        }
    }

    /// Append a column. Its type is numeric when every non-missing value is a number.
    ///
    /// In a text column, numbers are stored as their text form.
    pub fn add_column(&mut self, name: &str, values: Vec<ObsValue>) -> Result<()> {
        let column_type = if values.iter().any(|v| matches!(v, ObsValue::Text(_))) {
            ColumnType::Text
        } else {
            ColumnType::Numeric
        };
        self.push_column(name, values, column_type)
    }

    fn push_column(
        &mut self,
        name: &str,
        values: Vec<ObsValue>,
        column_type: ColumnType,
    ) -> Result<()> {
        if values.len() != self.n_cells() {
            return Err(PerturbError::DimensionMismatch {
                expected: self.n_cells(),
                actual: values.len(),
            });
        }
        if self.has_column(name) {
            return Err(PerturbError::InvalidParameter(format!(
                "Duplicate column '{}'",
                name
            )));
        }
        let values = match column_type {
            ColumnType::Text => values
                .into_iter()
                .map(|v| match v {
                    ObsValue::Number(n) => ObsValue::Text(n.to_string()),
                    other => other,
                })
                .collect(),
            ColumnType::Numeric => values,
        };
        self.column_names.push(name.to_string());
        self.columns.push(values);
        self.column_types.push(column_type);
        Ok(())
    }

    /// Builder-style [`add_column`](Self::add_column).
    pub fn with_column(mut self, name: &str, values: Vec<ObsValue>) -> Result<Self> {
        self.add_column(name, values)?;
        Ok(self)
    }

    /// Load an observation table from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with column names (first column is the cell ID)
    /// - Subsequent rows: cell ID followed by values
    ///
    /// Columns whose non-missing values all parse as numbers are stored as
    /// numeric, otherwise as text. Short rows are padded with missing values.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load an observation table from any TSV reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let raw_table = RawTable::read(reader, true)?;

        let mut table = Self::new(raw_table.cell_ids);
        for (name, raw) in raw_table.column_names.iter().zip(raw_table.columns) {
            let all_numeric = raw
                .iter()
                .all(|v| is_missing_token(v) || v.trim().parse::<f64>().is_ok());
            let values = raw
                .iter()
                .map(|v| {
                    if is_missing_token(v) {
                        ObsValue::Missing
                    } else if all_numeric {
                        // Checked above; the fallback is unreachable in practice.
                        v.trim()
                            .parse::<f64>()
                            .map(ObsValue::Number)
                            .unwrap_or(ObsValue::Missing)
                    } else {
                        ObsValue::Text(v.clone())
                    }
                })
                .collect();
            table.add_column(name, values)?;
        }
        Ok(table)
    }

    /// Load a table written by [`to_writer`](Self::to_writer), using the
    /// stored `schema` instead of guessing types.
    ///
    /// Text fields are kept verbatim, so `"001"` or `"NA"` stay text.
    /// Empty fields are missing unless listed in `empty_text_rows`.
    pub fn from_reader_with_schema<R: Read>(reader: R, schema: &[ColumnSchema]) -> Result<Self> {
        let raw_table = RawTable::read(reader, false)?;
        let stored: Vec<&str> = schema.iter().map(|c| c.name.as_str()).collect();
        if raw_table.column_names != stored {
            return Err(PerturbError::InvalidFormat(format!(
                "observation columns {:?} do not match schema {:?}",
                raw_table.column_names, stored
            )));
        }

        let n_cells = raw_table.cell_ids.len();
        let mut table = Self::new(raw_table.cell_ids);
        for (spec, raw) in schema.iter().zip(raw_table.columns) {
            if let Some(&bad) = spec.empty_text_rows.iter().find(|&&row| row >= n_cells) {
                return Err(PerturbError::InvalidFormat(format!(
                    "empty text row {} out of bounds in column '{}'",
                    bad, spec.name
                )));
            }
            let values = raw
                .into_iter()
                .enumerate()
                .map(|(row, field)| {
                    if field.is_empty() {
                        let empty_text = spec.column_type == ColumnType::Text
                            && spec.empty_text_rows.contains(&row);
                        return Ok(if empty_text {
                            ObsValue::Text(field)
                        } else {
                            ObsValue::Missing
                        });
                    }
                    match spec.column_type {
                        ColumnType::Text => Ok(ObsValue::Text(field)),
                        ColumnType::Numeric => field.parse::<f64>().map(ObsValue::Number).map_err(
                            |_| PerturbError::InvalidValue {
                                value: field.clone(),
                                line: row + 2,
                            },
                        ),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            table.push_column(&spec.name, values, spec.column_type)?;
        }
        Ok(table)
    }

    /// Column types plus the empty-string rows of text columns.
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.column_names
            .iter()
            .zip(&self.columns)
            .zip(&self.column_types)
            .map(|((name, values), &column_type)| ColumnSchema {
                name: name.clone(),
                column_type,
                empty_text_rows: values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| matches!(v, ObsValue::Text(s) if s.is_empty()))
                    .map(|(row, _)| row)
                    .collect(),
            })
            .collect()
    }

    /// Write the table to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.to_writer(file)
    }

    /// Write the table as TSV to any writer.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);

        let mut header = vec!["cell_id".to_string()];
        header.extend(self.column_names.iter().cloned());
        wtr.write_record(&header)?;

        for (row, cell_id) in self.cell_ids.iter().enumerate() {
            let mut record = Vec::with_capacity(self.n_columns() + 1);
            record.push(cell_id.clone());
            record.extend(self.columns.iter().map(|col| col[row].to_field()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Cell IDs in row order.
    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of cells (rows).
    pub fn n_cells(&self) -> usize {
        self.cell_ids.len()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.column_names
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| PerturbError::MissingColumn(column.to_string()))
    }

    /// All values of a column, in row order.
    pub fn column(&self, column: &str) -> Result<&[ObsValue]> {
        let idx = self.column_index(column)?;
        Ok(&self.columns[idx])
    }

    /// Inferred type of a column.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.column_index(column)
            .ok()
            .map(|idx| self.column_types[idx])
    }

    /// Value at a row and column.
    pub fn get(&self, row: usize, column: &str) -> Option<&ObsValue> {
        let idx = self.column_index(column).ok()?;
        self.columns[idx].get(row)
    }

    /// Keep only the rows at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_cells()) {
            return Err(PerturbError::InvalidParameter(format!(
                "Cell index {} out of bounds",
                bad
            )));
        }
        Ok(Self {
            cell_ids: indices.iter().map(|&i| self.cell_ids[i].clone()).collect(),
            column_names: self.column_names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| indices.iter().map(|&i| col[i].clone()).collect())
                .collect(),
            column_types: self.column_types.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cell_id\tperturbation\tdose_value\tcell_type").unwrap();
        writeln!(file, "AAAC-1\tdrugA\t10\tA549").unwrap();
        writeln!(file, "AAAG-1\tdrugA,drugB\t100\tA549").unwrap();
        writeln!(file, "AACT-1\tvehicle\t0\tMCF7").unwrap();
        writeln!(file, "AAGT-1\tdrugC\tNA\tK562").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_obs() {
        let file = create_test_tsv();
        let obs = ObsTable::from_tsv(file.path()).unwrap();

        assert_eq!(obs.n_cells(), 4);
        assert_eq!(obs.n_columns(), 3);
        assert_eq!(obs.cell_ids(), &["AAAC-1", "AAAG-1", "AACT-1", "AAGT-1"]);
        assert_eq!(obs.column_names(), &["perturbation", "dose_value", "cell_type"]);
    }

    #[test]
    fn test_column_type_inference() {
        let file = create_test_tsv();
        let obs = ObsTable::from_tsv(file.path()).unwrap();

        assert_eq!(obs.column_type("perturbation"), Some(ColumnType::Text));
        assert_eq!(obs.column_type("dose_value"), Some(ColumnType::Numeric));
        assert_eq!(obs.get(0, "dose_value"), Some(&ObsValue::Number(10.0)));
        assert!(obs.get(3, "dose_value").unwrap().is_missing());
    }

    #[test]
    fn test_mixed_column_stays_text() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cell_id\tdose_value").unwrap();
        writeln!(file, "c1\t10").unwrap();
        writeln!(file, "c2\tN/A").unwrap();
        file.flush().unwrap();

        let obs = ObsTable::from_tsv(file.path()).unwrap();
        assert_eq!(obs.column_type("dose_value"), Some(ColumnType::Text));
        assert_eq!(obs.get(0, "dose_value").unwrap().as_numeric(), Some(10.0));
        assert_eq!(obs.get(1, "dose_value").unwrap().as_numeric(), None);
    }

    #[test]
    fn test_coercion() {
        assert_eq!(ObsValue::Number(1.0).as_text().as_deref(), Some("1"));
        assert_eq!(ObsValue::Number(0.5).as_text().as_deref(), Some("0.5"));
        assert_eq!(ObsValue::Missing.as_text(), None);
        assert_eq!(ObsValue::from(" 2.5 ").as_numeric(), Some(2.5));
        assert_eq!(ObsValue::from("inf").as_numeric(), None);
        assert_eq!(ObsValue::Number(f64::NAN).as_numeric(), None);
        assert_eq!(ObsValue::parse("NA"), ObsValue::Missing);
        assert_eq!(ObsValue::from(None::<f64>), ObsValue::Missing);
    }

    #[test]
    fn test_missing_column() {
        let file = create_test_tsv();
        let obs = ObsTable::from_tsv(file.path()).unwrap();
        match obs.column("batch") {
            Err(PerturbError::MissingColumn(name)) => assert_eq!(name, "batch"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_select_preserves_order() {
        let file = create_test_tsv();
        let obs = ObsTable::from_tsv(file.path()).unwrap();

        let subset = obs.select(&[3, 0]).unwrap();
        assert_eq!(subset.cell_ids(), &["AAGT-1", "AAAC-1"]);
        assert_eq!(subset.get(1, "perturbation"), Some(&ObsValue::from("drugA")));
        assert!(obs.select(&[4]).is_err());
    }

    #[test]
    fn test_tsv_roundtrip() {
        let file = create_test_tsv();
        let obs = ObsTable::from_tsv(file.path()).unwrap();

        let out = NamedTempFile::new().unwrap();
        obs.to_tsv(out.path()).unwrap();
        let loaded = ObsTable::from_tsv(out.path()).unwrap();
        assert_eq!(loaded, obs);
    }

    #[test]
    fn test_schema_roundtrip_keeps_text() {
        let obs = ObsTable::new((0..6).map(|i| format!("c{}", i)).collect())
            .with_column(
                "plate",
                vec![
                    "001".into(),
                    "NA".into(),
                    "1e3".into(),
                    "".into(),
                    ObsValue::Missing,
                    " 7 ".into(),
                ],
            )
            .unwrap()
            .with_column(
                "dose_value",
                vec![
                    ObsValue::Number(0.1),
                    ObsValue::Missing,
                    ObsValue::Number(1e300),
                    ObsValue::Number(-2.5),
                    ObsValue::Number(3.0),
                    ObsValue::Missing,
                ],
            )
            .unwrap();

        let schema = obs.schema();
        assert_eq!(schema[0].column_type, ColumnType::Text);
        assert_eq!(schema[0].empty_text_rows, vec![3]);
        assert_eq!(schema[1].column_type, ColumnType::Numeric);

        let mut buf = Vec::new();
        obs.to_writer(&mut buf).unwrap();
        let loaded = ObsTable::from_reader_with_schema(buf.as_slice(), &schema).unwrap();

        assert_eq!(loaded, obs);
        assert_eq!(loaded.get(0, "plate"), Some(&ObsValue::from("001")));
        assert_eq!(loaded.get(1, "plate"), Some(&ObsValue::from("NA")));
        assert!(loaded.get(4, "plate").unwrap().is_missing());
    }

    #[test]
    fn test_all_missing_text_column_keeps_type() {
        let mut obs = ObsTable::new(vec!["c1".to_string(), "c2".to_string()]);
        obs.push_column("note", vec![ObsValue::Missing, ObsValue::Missing], ColumnType::Text)
            .unwrap();

        let mut buf = Vec::new();
        obs.to_writer(&mut buf).unwrap();
        let loaded = ObsTable::from_reader_with_schema(buf.as_slice(), &obs.schema()).unwrap();
        assert_eq!(loaded.column_type("note"), Some(ColumnType::Text));
        assert_eq!(loaded, obs);
    }

    #[test]
    fn test_schema_column_mismatch() {
        let file = create_test_tsv();
        let obs = ObsTable::from_tsv(file.path()).unwrap();
        let mut schema = obs.schema();
        schema.pop();

        let mut buf = Vec::new();
        obs.to_writer(&mut buf).unwrap();
        let result = ObsTable::from_reader_with_schema(buf.as_slice(), &schema);
        assert!(matches!(result, Err(PerturbError::InvalidFormat(_))));
    }

    #[test]
    fn test_numbers_in_text_column_become_text() {
        let obs = ObsTable::new(vec!["c1".to_string(), "c2".to_string()])
            .with_column("dose_value", vec![ObsValue::Number(1.0), "N/A".into()])
            .unwrap();
        assert_eq!(obs.get(0, "dose_value"), Some(&ObsValue::from("1")));
        assert_eq!(obs.get(0, "dose_value").unwrap().as_numeric(), Some(1.0));
    }

    #[test]
    fn test_add_column_dimension_check() {
        let mut obs = ObsTable::new(vec!["c1".to_string(), "c2".to_string()]);
        assert!(obs.add_column("perturbation", vec![ObsValue::from("a")]).is_err());
        obs.add_column("perturbation", vec!["a".into(), "b".into()]).unwrap();
        assert!(obs.add_column("perturbation", vec!["a".into(), "b".into()]).is_err());
    }
}
