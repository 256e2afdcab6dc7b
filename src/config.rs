//! Run configuration, loadable from YAML.

use crate::dose::{DoseOptions, DEFAULT_CONTROL_LABEL};
use crate::error::{PerturbError, Result};
use crate::filter::SeparatorSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings shared by the `inspect`, `filter` and `doses` runners.
///
/// Every field has a default, so a YAML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Container to read.
    pub input_path: Option<PathBuf>,
    /// Where the filtered container is written.
    pub output_path: Option<PathBuf>,
    /// Label column searched for separators.
    pub perturbation_column: String,
    /// Numeric dose column.
    pub dose_column: String,
    /// Separators that cause a cell to be removed.
    pub separators: SeparatorSet,
    /// Separators reported by `inspect`.
    pub survey_separators: SeparatorSet,
    /// Label of untreated cells, excluded from dose counts.
    pub control_label: String,
    /// Write the output even when no cell was removed.
    pub write_unchanged: bool,
    /// Optional SVG heatmap of the dose table.
    pub heatmap_path: Option<PathBuf>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            output_path: None,
            perturbation_column: "perturbation".to_string(),
            dose_column: "dose_value".to_string(),
            separators: SeparatorSet::comma(),
            survey_separators: SeparatorSet::default(),
            control_label: DEFAULT_CONTROL_LABEL.to_string(),
            write_unchanged: true,
            heatmap_path: None,
        }
    }
}

impl FilterConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(PerturbError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(PerturbError::from)
    }

    /// Load from a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PerturbError::InputNotFound(path.to_path_buf()));
        }
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Template written by `pfilter example`.
    pub fn example() -> Self {
        Self {
            input_path: Some(PathBuf::from("processed.amz")),
            output_path: Some(PathBuf::from("filtered.amz")),
            heatmap_path: Some(PathBuf::from("dose_heatmap.svg")),
            ..Self::default()
        }
    }

    pub fn dose_options(&self) -> DoseOptions {
        DoseOptions {
            perturbation_column: self.perturbation_column.clone(),
            dose_column: self.dose_column.clone(),
            control_label: self.control_label.clone(),
        }
    }

    /// Input path, or an error naming the missing setting.
    pub fn require_input(&self) -> Result<&Path> {
        self.input_path.as_deref().ok_or_else(|| {
            PerturbError::InvalidParameter("No input path given (use -i or input_path)".to_string())
        })
    }

    /// Output path, or an error naming the missing setting.
    pub fn require_output(&self) -> Result<&Path> {
        self.output_path.as_deref().ok_or_else(|| {
            PerturbError::InvalidParameter(
                "No output path given (use -o or output_path)".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = FilterConfig::default();
        assert_eq!(config.separators.as_slice(), &[","]);
        assert_eq!(config.survey_separators.len(), 5);
        assert_eq!(config.control_label, "vehicle");
        assert!(config.write_unchanged);
        assert!(config.input_path.is_none());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = FilterConfig::example();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("separators"));

        let parsed = FilterConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "separators: [',', '+']\ncontrol_label: DMSO\nwrite_unchanged: false\n";
        let config = FilterConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.separators.as_slice(), &[",", "+"]);
        assert_eq!(config.control_label, "DMSO");
        assert!(!config.write_unchanged);
        assert_eq!(config.perturbation_column, "perturbation");
        assert_eq!(config.dose_options().control_label, "DMSO");
    }

    #[test]
    fn test_empty_separator_rejected() {
        let result = FilterConfig::from_yaml("separators: ['']\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "input_path: data/in.amz").unwrap();
        writeln!(file, "dose_column: dose").unwrap();

        let config = FilterConfig::from_path(file.path()).unwrap();
        assert_eq!(config.require_input().unwrap(), Path::new("data/in.amz"));
        assert_eq!(config.dose_column, "dose");
        assert!(config.require_output().is_err());
    }

    #[test]
    fn test_from_missing_path() {
        let result = FilterConfig::from_path("/nonexistent/filter.yaml");
        assert!(matches!(result, Err(PerturbError::InputNotFound(_))));
    }
}
