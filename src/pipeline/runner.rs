//! Runners that load a container, act on it and report.

use crate::config::FilterConfig;
use crate::data::AnnotatedMatrix;
use crate::dose::{aggregate_doses, DoseAggregation};
use crate::error::Result;
use crate::filter::{
    detect_separators, filter_multi_perturbations, survey_separators, FilterSummary,
    SeparatorSurvey,
};
use crate::io::{read_container, write_container};
use crate::plot::{render_heatmap, HeatmapOptions};
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};

/// Load a container and log its shape.
pub fn load(path: &Path) -> Result<AnnotatedMatrix> {
    info!("Loading data from {}", path.display());
    let adata = read_container(path)?;
    info!(
        "Loaded {} cells x {} features",
        adata.n_cells(),
        adata.n_features()
    );
    Ok(adata)
}

/// What `inspect` found in the label column.
#[derive(Debug, Clone)]
pub struct InspectReport {
    pub shape: (usize, usize),
    pub survey: SeparatorSurvey,
    /// Cells that removal with the survey separators would drop.
    pub n_removable: usize,
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data: {} cells x {} features", self.shape.0, self.shape.1)?;
        write!(f, "{}", self.survey)?;
        let separators: Vec<&str> = self.survey.hits.iter().map(|h| h.separator.as_str()).collect();
        writeln!(
            f,
            "Removing cells containing any of {:?} would drop {} and keep {} cells",
            separators,
            self.n_removable,
            self.shape.0 - self.n_removable
        )
    }
}

/// Survey `config.survey_separators` in an in-memory dataset.
pub fn inspect(
    adata: &AnnotatedMatrix,
    config: &FilterConfig,
    max_examples: usize,
) -> Result<InspectReport> {
    let column = &config.perturbation_column;
    let survey = survey_separators(adata.obs(), column, &config.survey_separators, max_examples)?;
    let mask = detect_separators(adata.obs(), column, &config.survey_separators)?;
    Ok(InspectReport {
        shape: adata.shape(),
        survey,
        n_removable: mask.n_removed(),
    })
}

/// Load `config.input_path` and survey it.
pub fn run_inspect(config: &FilterConfig, max_examples: usize) -> Result<InspectReport> {
    let adata = load(config.require_input()?)?;
    inspect(&adata, config, max_examples)
}

/// What `filter` did.
#[derive(Debug, Clone)]
pub struct FilterReport {
    pub summary: FilterSummary,
    pub output_path: PathBuf,
    /// False when the output was skipped because nothing changed.
    pub written: bool,
    pub output_shape: (usize, usize),
}

impl fmt::Display for FilterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        if self.written {
            writeln!(
                f,
                "Saved {} cells x {} features to {}",
                self.output_shape.0,
                self.output_shape.1,
                self.output_path.display()
            )
        } else {
            writeln!(
                f,
                "No cells removed; {} not written",
                self.output_path.display()
            )
        }
    }
}

/// Load, remove multi-perturbation cells and write the result.
///
/// When nothing matches, the unchanged data is still written unless
/// `config.write_unchanged` is false.
pub fn run_filter(config: &FilterConfig) -> Result<FilterReport> {
    let input = config.require_input()?;
    let output = config.require_output()?;
    let adata = load(input)?;

    let outcome =
        filter_multi_perturbations(&adata, &config.perturbation_column, &config.separators)?;
    let written = !outcome.summary.is_unchanged() || config.write_unchanged;
    if written {
        info!("Saving filtered data to {}", output.display());
        write_container(&outcome.kept, output)?;
    } else {
        info!("Skipping output: no cells removed");
    }

    Ok(FilterReport {
        output_shape: outcome.kept.shape(),
        summary: outcome.summary,
        output_path: output.to_path_buf(),
        written,
    })
}

/// What `doses` computed.
#[derive(Debug, Clone)]
pub struct DoseReport {
    pub shape: (usize, usize),
    pub aggregation: DoseAggregation,
    pub heatmap_path: Option<PathBuf>,
}

/// Aggregate doses in memory and optionally draw the heatmap.
///
/// With `top`, the heatmap shows only the perturbations with the most cells.
pub fn doses(
    adata: &AnnotatedMatrix,
    config: &FilterConfig,
    top: Option<usize>,
) -> Result<DoseReport> {
    let aggregation = aggregate_doses(adata.obs(), &config.dose_options())?;

    let mut heatmap_path = None;
    if let Some(path) = &config.heatmap_path {
        let table = match top {
            Some(n) => {
                info!("Plotting top {} perturbations by cell count", n);
                aggregation.table.top_by_total(n)
            }
            None => aggregation.table.clone(),
        };
        if table.is_empty() {
            warn!("Cannot generate heatmap: no data to plot");
        } else {
            render_heatmap(&table, path, &HeatmapOptions::default())?;
            heatmap_path = Some(path.clone());
        }
    }

    Ok(DoseReport {
        shape: adata.shape(),
        aggregation,
        heatmap_path,
    })
}

/// Load `config.input_path` and tabulate doses.
pub fn run_doses(config: &FilterConfig, top: Option<usize>) -> Result<DoseReport> {
    let adata = load(config.require_input()?)?;
    doses(&adata, config, top)
}

/// Build a container from an observation TSV and a dense matrix TSV.
pub fn run_pack(obs_path: &Path, matrix_path: &Path, output: &Path) -> Result<(usize, usize)> {
    info!(
        "Packing {} and {} into {}",
        obs_path.display(),
        matrix_path.display(),
        output.display()
    );
    let adata = AnnotatedMatrix::from_tsv(obs_path, matrix_path)?;
    write_container(&adata, output)?;
    Ok(adata.shape())
}
