//! Error types for the perturb-filter library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum PerturbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    #[error("Invalid matrix value '{value}' at line {line}")]
    InvalidValue { value: String, line: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cell ID mismatch: {0}")]
    CellMismatch(String),

    #[error("Column '{0}' not found in observation table")]
    MissingColumn(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid separator pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Plot rendering error: {0}")]
    Plot(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PerturbError {
    /// A short hint for the user, for the failures that abort a run on bad input.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            PerturbError::InputNotFound(_) => {
                Some("Please ensure the input file exists at the specified path.")
            }
            PerturbError::MissingColumn(_) => {
                Some("Please check the observation table of your input file.")
            }
            _ => None,
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, PerturbError>;
