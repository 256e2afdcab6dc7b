//! SVG heatmap of a dose-frequency table.

use crate::dose::DoseFrequencyTable;
use crate::error::{PerturbError, Result};
use crate::plot::colormap::{normalize, viridis};
use log::{info, warn};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontTransform;
use std::path::Path;

/// Above this many rows the tick labels are shrunk.
pub const CROWDED_ROWS: usize = 50;

const TITLE_HEIGHT: i32 = 60;
const BOTTOM_MARGIN: i32 = 70;
const RIGHT_MARGIN: i32 = 110;
const PLOT_MARGIN: i32 = 10;
const COLORBAR_WIDTH: i32 = 20;
const COLORBAR_STEPS: i32 = 100;
const GRID_COLOR: RGBColor = RGBColor(211, 211, 211);

/// Rendering options for [`render_heatmap`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapOptions {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub colorbar_label: String,
    /// Canvas resolution.
    pub pixels_per_inch: u32,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        Self {
            title: "Frequency of Dose Values per Perturbation".to_string(),
            x_label: "Dose Value".to_string(),
            y_label: "Perturbation".to_string(),
            colorbar_label: "log(Cell Count + 1)".to_string(),
            pixels_per_inch: 100,
        }
    }
}

/// Canvas geometry derived from the table shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatmapLayout {
    pub width: u32,
    pub height: u32,
    pub label_font: u32,
}

impl HeatmapLayout {
    /// Width grows with the dose count (0.6 in each, at least 8 in);
    /// height with the perturbation count (0.2 in each, at least 10 in).
    pub fn for_shape(n_perturbations: usize, n_doses: usize, pixels_per_inch: u32) -> Self {
        let ppi = pixels_per_inch as f64;
        let width_in = (n_doses as f64 * 0.6).max(8.0);
        let height_in = (n_perturbations as f64 * 0.2).max(10.0);
        let label_font = if n_perturbations > CROWDED_ROWS { 8 } else { 12 };
        Self {
            width: (width_in * ppi).round() as u32,
            height: (height_in * ppi).round() as u32,
            label_font,
        }
    }
}

/// Render the `ln(1 + count)` heatmap of `table` to an SVG file at `path`.
///
/// Perturbations run down the y axis in table order, doses across the x
/// axis in ascending order. The colour range spans the smallest and largest
/// cell values.
pub fn render_heatmap<P: AsRef<Path>>(
    table: &DoseFrequencyTable,
    path: P,
    opts: &HeatmapOptions,
) -> Result<HeatmapLayout> {
    if table.is_empty() {
        return Err(PerturbError::EmptyData(
            "no perturbation/dose pairs to plot".to_string(),
        ));
    }
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let n_rows = table.n_perturbations();
    let n_cols = table.n_doses();
    if n_rows > CROWDED_ROWS {
        warn!(
            "Heatmap has {} perturbations; labels may be hard to read",
            n_rows
        );
    }

    let layout = HeatmapLayout::for_shape(n_rows, n_cols, opts.pixels_per_inch);
    let values = table.log1p();
    let (v_min, v_max) = values
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let longest_label = table
        .perturbations()
        .iter()
        .map(|p| p.chars().count())
        .max()
        .unwrap_or(0);
    let label_width = (longest_label as f64 * layout.label_font as f64 * 0.6) as i32 + 40;

    let plot_left = label_width + PLOT_MARGIN;
    let plot_top = TITLE_HEIGHT;
    let plot_width = (layout.width as i32 - plot_left - RIGHT_MARGIN).max(n_cols as i32);
    let plot_height =
        (layout.height as i32 - TITLE_HEIGHT - BOTTOM_MARGIN).max(n_rows as i32);
    let cell_width = plot_width as f64 / n_cols as f64;
    let cell_height = plot_height as f64 / n_rows as f64;

    let root = SVGBackend::new(path, (layout.width, layout.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let centered = Pos::new(HPos::Center, VPos::Center);
    let right_aligned = Pos::new(HPos::Right, VPos::Center);
    let tick_style = ("sans-serif", layout.label_font)
        .into_font()
        .color(&BLACK);

    root.draw(&Text::new(
        opts.title.as_str(),
        (layout.width as i32 / 2, TITLE_HEIGHT / 2),
        ("sans-serif", 20).into_font().color(&BLACK).pos(centered),
    ))
    .map_err(plot_err)?;

    for (row_idx, row) in values.iter().enumerate() {
        let y0 = plot_top as f64 + row_idx as f64 * cell_height;
        for (col_idx, &value) in row.iter().enumerate() {
            let x0 = plot_left as f64 + col_idx as f64 * cell_width;
            let corners = [
                (x0 as i32, y0 as i32),
                ((x0 + cell_width) as i32, (y0 + cell_height) as i32),
            ];
            let color = viridis(normalize(value, v_min, v_max));
            root.draw(&Rectangle::new(corners, color.filled()))
                .map_err(plot_err)?;
            root.draw(&Rectangle::new(corners, GRID_COLOR.stroke_width(1)))
                .map_err(plot_err)?;
        }
    }

    for (row_idx, label) in table.perturbations().iter().enumerate() {
        let y = plot_top + ((row_idx as f64 + 0.5) * cell_height) as i32;
        root.draw(&Text::new(
            label.as_str(),
            (plot_left - 5, y),
            tick_style.clone().pos(right_aligned),
        ))
        .map_err(plot_err)?;
    }

    let axis_y = plot_top + plot_height;
    for (col_idx, dose) in table.doses().iter().enumerate() {
        let x = plot_left + ((col_idx as f64 + 0.5) * cell_width) as i32;
        root.draw(&Text::new(
            dose.to_string(),
            (x, axis_y + 5),
            tick_style.clone().pos(Pos::new(HPos::Center, VPos::Top)),
        ))
        .map_err(plot_err)?;
    }

    root.draw(&Text::new(
        opts.x_label.as_str(),
        (plot_left + plot_width / 2, axis_y + BOTTOM_MARGIN / 2 + 10),
        ("sans-serif", 14).into_font().color(&BLACK).pos(centered),
    ))
    .map_err(plot_err)?;
    root.draw(&Text::new(
        opts.y_label.as_str(),
        (15, plot_top + plot_height / 2),
        ("sans-serif", 14)
            .into_font()
            .transform(FontTransform::Rotate270)
            .color(&BLACK)
            .pos(centered),
    ))
    .map_err(plot_err)?;

    draw_colorbar(
        &root,
        plot_left + plot_width + 20,
        plot_top,
        plot_height,
        (v_min, v_max),
        &opts.colorbar_label,
    )?;

    root.present().map_err(plot_err)?;
    info!(
        "Wrote {}x{} heatmap to {}",
        n_rows,
        n_cols,
        path.display()
    );
    Ok(layout)
}

fn draw_colorbar(
    root: &DrawingArea<SVGBackend<'_>, plotters::coord::Shift>,
    x: i32,
    top: i32,
    height: i32,
    (v_min, v_max): (f64, f64),
    label: &str,
) -> Result<()> {
    let step = height as f64 / COLORBAR_STEPS as f64;
    for i in 0..COLORBAR_STEPS {
        // Top of the bar is the maximum.
        let t = 1.0 - i as f64 / (COLORBAR_STEPS - 1) as f64;
        let y0 = top as f64 + i as f64 * step;
        root.draw(&Rectangle::new(
            [(x, y0 as i32), (x + COLORBAR_WIDTH, (y0 + step).ceil() as i32)],
            viridis(t).filled(),
        ))
        .map_err(plot_err)?;
    }

    let tick_style = ("sans-serif", 10)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Left, VPos::Center));
    for (value, y) in [(v_max, top), (v_min, top + height)] {
        root.draw(&Text::new(
            format!("{:.1}", value),
            (x + COLORBAR_WIDTH + 4, y),
            tick_style.clone(),
        ))
        .map_err(plot_err)?;
    }

    root.draw(&Text::new(
        label,
        (x + COLORBAR_WIDTH + 50, top + height / 2),
        ("sans-serif", 12)
            .into_font()
            .transform(FontTransform::Rotate90)
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center)),
    ))
    .map_err(plot_err)?;
    Ok(())
}

fn plot_err<E: std::fmt::Display>(e: E) -> PerturbError {
    PerturbError::Plot(e.to_string())
}
