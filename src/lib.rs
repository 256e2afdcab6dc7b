//! Perturbation filtering for single-cell datasets
//!
//! This library removes cells treated with more than one perturbation from an
//! annotated expression matrix and tabulates how often each dose was used
//! per perturbation.
//!
//! # Overview
//!
//! - **data**: Core data structures (ExpressionMatrix, ObsTable, AnnotatedMatrix)
//! - **io**: Zip container holding an annotated matrix
//! - **filter**: Separator detection and cell removal
//! - **dose**: Perturbation × dose frequency tables
//! - **plot**: SVG heatmap of a frequency table
//! - **config**: YAML run configuration
//! - **pipeline**: Load → filter → write/report runners
//!
//! # Example
//!
//! ```no_run
//! use perturb_filter::prelude::*;
//!
//! let adata = read_container("processed.amz").unwrap();
//! let outcome = filter_multi_perturbations(
//!     &adata,
//!     "perturbation",
//!     &SeparatorSet::comma(),
//! )
//! .unwrap();
//! write_container(&outcome.kept, "filtered.amz").unwrap();
//!
//! let doses = aggregate_doses(outcome.kept.obs(), &DoseOptions::default()).unwrap();
//! println!("{}", doses.table.head(10));
//! ```

pub mod config;
pub mod data;
pub mod dose;
pub mod error;
pub mod filter;
pub mod io;
pub mod pipeline;
pub mod plot;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::config::FilterConfig;
    pub use crate::data::{AnnotatedMatrix, ColumnType, ExpressionMatrix, ObsTable, ObsValue};
    pub use crate::dose::{aggregate_doses, DoseAggregation, DoseFrequencyTable, DoseOptions};
    pub use crate::error::{PerturbError, Result};
    pub use crate::filter::{
        detect_separators, filter_multi_perturbations, survey_separators, FilterOutcome,
        FilterSummary, RemovalMask, SeparatorSet, SeparatorSurvey,
    };
    pub use crate::io::{read_container, write_container, Manifest};
    pub use crate::pipeline::{run_doses, run_filter, run_inspect, run_pack};
    pub use crate::plot::{render_heatmap, HeatmapOptions};
}
