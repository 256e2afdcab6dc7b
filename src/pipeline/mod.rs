//! Load → detect → filter → (persist | report) runners used by the CLI.

mod runner;

pub use runner::{
    doses, inspect, load, run_doses, run_filter, run_inspect, run_pack, DoseReport,
    FilterReport, InspectReport,
};
