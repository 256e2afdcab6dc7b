//! Plotting of dose-frequency tables.

pub mod colormap;
mod heatmap;

pub use heatmap::{render_heatmap, HeatmapLayout, HeatmapOptions, CROWDED_ROWS};
