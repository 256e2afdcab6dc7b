//! pfilter - single-cell perturbation filter CLI
//!
//! Command-line interface for removing multi-perturbation cells and
//! summarising dose usage.

use clap::{Parser, Subcommand};
use perturb_filter::config::FilterConfig;
use perturb_filter::error::Result;
use perturb_filter::filter::SeparatorSet;
use perturb_filter::pipeline::{run_doses, run_filter, run_inspect, run_pack};
use std::path::{Path, PathBuf};

/// Single-cell perturbation filter
#[derive(Parser)]
#[command(name = "pfilter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that read a container.
#[derive(clap::Args)]
struct Common {
    /// Input container (.amz)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// YAML configuration; flags given here override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Label column to inspect
    #[arg(long)]
    perturbation_column: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Report which separators occur in perturbation labels
    Inspect {
        #[command(flatten)]
        common: Common,

        /// Separator characters to look for (default: ",;+&/")
        #[arg(short, long)]
        separators: Option<String>,

        /// Unique example labels shown per separator
        #[arg(long, default_value = "5")]
        examples: usize,
    },

    /// Remove cells whose perturbation label contains a separator
    Filter {
        #[command(flatten)]
        common: Common,

        /// Output container
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Separator characters that mark a multi-perturbation (default: ",")
        #[arg(short, long)]
        separators: Option<String>,

        /// Do not write the output when no cell is removed
        #[arg(long)]
        skip_unchanged: bool,
    },

    /// Tabulate dose values per perturbation
    Doses {
        #[command(flatten)]
        common: Common,

        /// Dose column name
        #[arg(long)]
        dose_column: Option<String>,

        /// Control label excluded from the table
        #[arg(long)]
        control: Option<String>,

        /// Write an SVG heatmap to this path
        #[arg(long)]
        heatmap: Option<PathBuf>,

        /// Perturbations printed in the console table
        #[arg(long, default_value = "10")]
        rows: usize,

        /// Plot only the N perturbations with the most cells
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        top: Option<usize>,
    },

    /// Build a container from an observation TSV and a dense matrix TSV
    Pack {
        /// Observation table (first column: cell id)
        #[arg(long)]
        obs: PathBuf,

        /// Dense cells x features matrix (first column: cell id)
        #[arg(long)]
        matrix: PathBuf,

        /// Output container
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate an example configuration file
    Example {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "filter.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Inspect {
            common,
            separators,
            examples,
        } => cmd_inspect(&common, separators.as_deref(), examples),

        Commands::Filter {
            common,
            output,
            separators,
            skip_unchanged,
        } => cmd_filter(&common, output, separators.as_deref(), skip_unchanged),

        Commands::Doses {
            common,
            dose_column,
            control,
            heatmap,
            rows,
            top,
        } => cmd_doses(&common, dose_column, control, heatmap, rows, top),

        Commands::Pack {
            obs,
            matrix,
            output,
        } => cmd_pack(&obs, &matrix, &output),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if let Some(hint) = e.hint() {
            eprintln!("{}", hint);
        }
        std::process::exit(1);
    }
}

/// Load the config file (if any) and apply the shared overrides.
fn load_config(common: &Common) -> Result<FilterConfig> {
    let mut config = match &common.config {
        Some(path) => FilterConfig::from_path(path)?,
        None => FilterConfig::default(),
    };
    if let Some(input) = &common.input {
        config.input_path = Some(input.clone());
    }
    if let Some(column) = &common.perturbation_column {
        config.perturbation_column = column.clone();
    }
    Ok(config)
}

/// Survey separators in the label column
fn cmd_inspect(common: &Common, separators: Option<&str>, examples: usize) -> Result<()> {
    let mut config = load_config(common)?;
    if let Some(chars) = separators {
        config.survey_separators = SeparatorSet::from_chars(chars)?;
    }

    let report = run_inspect(&config, examples)?;
    println!("{}", report);
    Ok(())
}

/// Filter multi-perturbation cells and save
fn cmd_filter(
    common: &Common,
    output: Option<PathBuf>,
    separators: Option<&str>,
    skip_unchanged: bool,
) -> Result<()> {
    let mut config = load_config(common)?;
    if output.is_some() {
        config.output_path = output;
    }
    if let Some(chars) = separators {
        config.separators = SeparatorSet::from_chars(chars)?;
    }
    if skip_unchanged {
        config.write_unchanged = false;
    }

    let report = run_filter(&config)?;
    println!("{}", report);
    Ok(())
}

/// Print the dose frequency table and optionally plot it
fn cmd_doses(
    common: &Common,
    dose_column: Option<String>,
    control: Option<String>,
    heatmap: Option<PathBuf>,
    rows: usize,
    top: Option<usize>,
) -> Result<()> {
    let mut config = load_config(common)?;
    if let Some(column) = dose_column {
        config.dose_column = column;
    }
    if let Some(label) = control {
        config.control_label = label;
    }
    if heatmap.is_some() {
        config.heatmap_path = heatmap;
    }

    let report = run_doses(&config, top)?;
    let aggregation = &report.aggregation;
    println!("{}", aggregation);

    if aggregation.is_empty() {
        println!("No perturbed cells with a numeric dose were found.");
        return Ok(());
    }

    let table = &aggregation.table;
    println!(
        "Frequency Table (Perturbations vs Dose Values, showing first {} perturbations):",
        rows.min(table.n_perturbations())
    );
    println!("{}", table.head(rows));

    println!("Most common dose per perturbation (first {}):", rows);
    for (label, dose) in table.most_common_doses().into_iter().take(rows) {
        println!("  {:<30} {}", label, dose);
    }

    if let Some(path) = &report.heatmap_path {
        println!();
        println!(
            "Heatmap ({} perturbations x {} doses) written to {}",
            top.map_or(table.n_perturbations(), |n| n.min(table.n_perturbations())),
            table.n_doses(),
            path.display()
        );
    }
    Ok(())
}

/// Pack TSV inputs into a container
fn cmd_pack(obs: &Path, matrix: &Path, output: &Path) -> Result<()> {
    let (n_cells, n_features) = run_pack(obs, matrix, output)?;
    println!(
        "Wrote {} cells x {} features to {}",
        n_cells,
        n_features,
        output.display()
    );
    Ok(())
}

/// Generate example config
fn cmd_example(output_path: &Path) -> Result<()> {
    let yaml = FilterConfig::example().to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
