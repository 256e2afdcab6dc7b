//! Dose-frequency tabulation per perturbation.

mod aggregate;
mod frequency;

pub use aggregate::{aggregate_doses, DoseAggregation, DoseOptions, DEFAULT_CONTROL_LABEL};
pub use frequency::DoseFrequencyTable;
