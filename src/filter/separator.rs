//! Detection of multi-perturbation labels by separator characters.

use crate::data::{ObsTable, ObsValue};
use crate::error::{PerturbError, Result};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separators that join several treatments into one label.
pub const DEFAULT_SEPARATORS: [&str; 5] = [",", ";", "+", "&", "/"];

/// An ordered set of non-empty separator strings.
///
/// Matching is any-of: a label matches when it contains at least one
/// separator as a literal substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SeparatorSet {
    separators: Vec<String>,
}

impl SeparatorSet {
    /// Build a set, dropping duplicates but keeping first-seen order.
    ///
    /// Empty strings are rejected since they would match every label.
    pub fn new<I, S>(separators: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for sep in separators {
            let sep = sep.into();
            if sep.is_empty() {
                return Err(PerturbError::InvalidParameter(
                    "Separators must be non-empty strings".to_string(),
                ));
            }
            if !unique.contains(&sep) {
                unique.push(sep);
            }
        }
        Ok(Self { separators: unique })
    }

    /// A set with a single separator, e.g. comma-only filtering.
    pub fn single(separator: &str) -> Result<Self> {
        Self::new([separator])
    }

    /// Comma only: the default for removal.
    pub fn comma() -> Self {
        Self {
            separators: vec![",".to_string()],
        }
    }

    /// Parse a command-line value: every character is one separator.
    pub fn from_chars(chars: &str) -> Result<Self> {
        Self::new(chars.chars().map(String::from))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.separators.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.separators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.separators.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.separators
    }

    /// Regex alternation of the escaped separators, e.g. `,|;|\+`.
    pub fn pattern(&self) -> String {
        self.separators
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Compiled matcher, or `None` for an empty set (which matches nothing).
    pub fn matcher(&self) -> Result<Option<Regex>> {
        if self.is_empty() {
            return Ok(None);
        }
        Ok(Some(Regex::new(&self.pattern())?))
    }
}

impl Default for SeparatorSet {
    fn default() -> Self {
        Self {
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for SeparatorSet {
    type Error = PerturbError;

    fn try_from(separators: Vec<String>) -> Result<Self> {
        Self::new(separators)
    }
}

impl From<SeparatorSet> for Vec<String> {
    fn from(set: SeparatorSet) -> Self {
        set.separators
    }
}

impl fmt::Display for SeparatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.separators.iter().map(|s| format!("'{}'", s)).collect();
        write!(f, "[{}]", quoted.join(", "))
    }
}

/// Per-row flags, `true` for rows to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalMask {
    mask: Vec<bool>,
}

impl RemovalMask {
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// Whether row `i` is flagged for removal.
    pub fn get(&self, i: usize) -> Option<bool> {
        self.mask.get(i).copied()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.mask
    }

    /// Number of rows flagged for removal.
    pub fn n_removed(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// Number of rows to keep.
    pub fn n_kept(&self) -> usize {
        self.len() - self.n_removed()
    }

    /// True if any row is flagged.
    pub fn any(&self) -> bool {
        self.mask.iter().any(|&m| m)
    }
}

impl From<Vec<bool>> for RemovalMask {
    fn from(mask: Vec<bool>) -> Self {
        Self { mask }
    }
}

fn value_matches(value: &ObsValue, matcher: &Regex) -> bool {
    match value {
        ObsValue::Text(s) => matcher.is_match(s),
        ObsValue::Number(_) => value.as_text().is_some_and(|s| matcher.is_match(&s)),
        ObsValue::Missing => false,
    }
}

/// Flag rows whose `column` value, coerced to text, contains any separator.
///
/// Missing values never match. An empty separator set flags nothing.
/// Numbers are matched in their shortest form, so `1.0` reads as `"1"`.
pub fn detect_separators(
    obs: &ObsTable,
    column: &str,
    separators: &SeparatorSet,
) -> Result<RemovalMask> {
    let values = obs.column(column)?;
    let Some(matcher) = separators.matcher()? else {
        return Ok(RemovalMask::from(vec![false; values.len()]));
    };

    let mask: Vec<bool> = values
        .par_iter()
        .map(|value| value_matches(value, &matcher))
        .collect();
    Ok(RemovalMask::from(mask))
}

/// Cells matched by one separator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparatorHits {
    pub separator: String,
    /// Number of cells whose label contains the separator.
    pub n_cells: usize,
    /// Unique matching labels in first-seen order, truncated.
    pub examples: Vec<String>,
}

/// Per-separator breakdown of a label column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeparatorSurvey {
    pub column: String,
    pub n_cells: usize,
    pub hits: Vec<SeparatorHits>,
}

impl SeparatorSurvey {
    /// True if any separator matched at least one cell.
    pub fn any_found(&self) -> bool {
        self.hits.iter().any(|h| h.n_cells > 0)
    }
}

impl fmt::Display for SeparatorSurvey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Separators in '{}' ({} cells)", self.column, self.n_cells)?;
        if !self.any_found() {
            writeln!(f, "  No examples found for any specified separator.")?;
            return Ok(());
        }
        for hit in self.hits.iter().filter(|h| h.n_cells > 0) {
            writeln!(
                f,
                "  '{}' found in {} cells, e.g. {:?}",
                hit.separator, hit.n_cells, hit.examples
            )?;
        }
        Ok(())
    }
}

/// Count cells per separator and collect up to `max_examples` unique labels for each.
pub fn survey_separators(
    obs: &ObsTable,
    column: &str,
    separators: &SeparatorSet,
    max_examples: usize,
) -> Result<SeparatorSurvey> {
    let labels: Vec<Option<String>> = obs.column(column)?.iter().map(ObsValue::as_text).collect();

    let hits = separators
        .iter()
        .map(|sep| {
            let mut n_cells = 0;
            let mut examples: Vec<String> = Vec::new();
            for label in labels.iter().flatten().filter(|l| l.contains(sep)) {
                n_cells += 1;
                if examples.len() < max_examples && !examples.contains(label) {
                    examples.push(label.clone());
                }
            }
            SeparatorHits {
                separator: sep.to_string(),
                n_cells,
                examples,
            }
        })
        .collect();

    Ok(SeparatorSurvey {
        column: column.to_string(),
        n_cells: obs.n_cells(),
        hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_obs(labels: Vec<ObsValue>) -> ObsTable {
        let cell_ids = (0..labels.len()).map(|i| format!("cell_{}", i)).collect();
        ObsTable::new(cell_ids)
            .with_column("perturbation", labels)
            .unwrap()
    }

    #[test]
    fn test_comma_only() {
        let obs = create_test_obs(vec!["drugA,drugB".into(), "drugA".into()]);
        let seps = SeparatorSet::single(",").unwrap();
        let mask = detect_separators(&obs, "perturbation", &seps).unwrap();
        assert_eq!(mask.as_slice(), &[true, false]);
    }

    #[test]
    fn test_numeric_labels_use_shortest_text() {
        let obs = create_test_obs(vec![ObsValue::Number(1.0), ObsValue::Number(0.5)]);
        let seps = SeparatorSet::single(".").unwrap();
        let mask = detect_separators(&obs, "perturbation", &seps).unwrap();
        assert_eq!(mask.as_slice(), &[false, true]);
    }

    #[test]
    fn test_any_of_matching() {
        let obs = create_test_obs(vec![
            "drugA+drugB".into(),
            "drugA/drugB".into(),
            "drugA".into(),
            "drugA;drugB&drugC".into(),
        ]);
        let mask = detect_separators(&obs, "perturbation", &SeparatorSet::default()).unwrap();
        assert_eq!(mask.as_slice(), &[true, true, false, true]);
        assert_eq!(mask.n_removed(), 3);
        assert_eq!(mask.n_kept(), 1);
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        // '+' and '.' must not act as regex operators
        let obs = create_test_obs(vec!["a+b".into(), "ab".into(), "a.b".into(), "axb".into()]);
        let seps = SeparatorSet::new(["+", "."]).unwrap();
        let mask = detect_separators(&obs, "perturbation", &seps).unwrap();
        assert_eq!(mask.as_slice(), &[true, false, true, false]);
    }

    #[test]
    fn test_missing_and_numeric_values() {
        let obs = create_test_obs(vec![ObsValue::Missing, ObsValue::Number(0.5), "".into()]);
        let seps = SeparatorSet::new([",", "."]).unwrap();
        let mask = detect_separators(&obs, "perturbation", &seps).unwrap();
        // 0.5 is coerced to "0.5" before matching
        assert_eq!(mask.as_slice(), &[false, true, false]);
    }

    #[test]
    fn test_empty_separator_set() {
        let obs = create_test_obs(vec!["a,b".into(), "c".into()]);
        let seps = SeparatorSet::new(Vec::<String>::new()).unwrap();
        let mask = detect_separators(&obs, "perturbation", &seps).unwrap();
        assert!(!mask.any());
        assert_eq!(mask.len(), 2);
    }

    #[test]
    fn test_missing_column() {
        let obs = create_test_obs(vec!["a".into()]);
        let result = detect_separators(&obs, "treatment", &SeparatorSet::default());
        assert!(matches!(result, Err(PerturbError::MissingColumn(c)) if c == "treatment"));
    }

    #[test]
    fn test_separator_set_construction() {
        assert!(SeparatorSet::new([",", ""]).is_err());

        let seps = SeparatorSet::from_chars(",;,+").unwrap();
        assert_eq!(seps.as_slice(), &[",", ";", "+"]);
        assert_eq!(seps.pattern(), r",|;|\+");
        assert_eq!(seps.to_string(), "[',', ';', '+']");
    }

    #[test]
    fn test_separator_set_yaml() {
        let seps: SeparatorSet = serde_yaml::from_str("[',', '+']").unwrap();
        assert_eq!(seps.len(), 2);
        assert!(serde_yaml::from_str::<SeparatorSet>("['']").is_err());
    }

    #[test]
    fn test_survey() {
        let obs = create_test_obs(vec![
            "drugA,drugB".into(),
            "drugA,drugB".into(),
            "drugC,drugD".into(),
            "drugE+drugF".into(),
            "drugG".into(),
            ObsValue::Missing,
        ]);
        let seps = SeparatorSet::new([",", "+", "/"]).unwrap();
        let survey = survey_separators(&obs, "perturbation", &seps, 5).unwrap();

        assert!(survey.any_found());
        assert_eq!(survey.n_cells, 6);
        assert_eq!(survey.hits[0].n_cells, 3);
        assert_eq!(survey.hits[0].examples, vec!["drugA,drugB", "drugC,drugD"]);
        assert_eq!(survey.hits[1].n_cells, 1);
        assert_eq!(survey.hits[2].n_cells, 0);
        assert!(survey.hits[2].examples.is_empty());
    }

    #[test]
    fn test_survey_example_limit() {
        let labels = (0..10).map(|i| ObsValue::Text(format!("d{},x", i))).collect();
        let obs = create_test_obs(labels);
        let survey =
            survey_separators(&obs, "perturbation", &SeparatorSet::single(",").unwrap(), 5).unwrap();
        assert_eq!(survey.hits[0].n_cells, 10);
        assert_eq!(survey.hits[0].examples.len(), 5);
    }
}
