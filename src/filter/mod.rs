//! Detecting and removing multi-perturbation cells.

pub mod apply;
pub mod separator;

pub use apply::{
    filter_multi_perturbations, partition, split_annotated, split_obs, FilterOutcome,
    FilterSummary, Partition,
};
pub use separator::{
    detect_separators, survey_separators, RemovalMask, SeparatorHits, SeparatorSet,
    SeparatorSurvey, DEFAULT_SEPARATORS,
};
