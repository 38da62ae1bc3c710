//! Command-line interface for stereorec.
//!
//! `reconstruct` runs the read-mode pipeline over event streams, `fill`
//! builds lookup tables from simulated events, and `table-info` prints
//! the coverage of a table file.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;

use stereorec_algorithms::{
    EventOutcome, EventProcessor, RunSummary, TableLayout, TableSet, TableTarget,
};
use stereorec_core::{
    FillCuts, LookupConfig, ProcessingMode, ReconstructionMethod, RunConfig, SpectralWeighting,
    TelescopeArray,
};
use stereorec_io::{EventFileReader, EventWriter};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    StereorecIo(#[from] stereorec_io::Error),

    #[error("configuration error: {0}")]
    Core(#[from] stereorec_core::Error),

    #[error("no input files")]
    NoInput,

    #[error("{}: {source}", .path.display())]
    Event {
        path: PathBuf,
        source: stereorec_core::Error,
    },
}

/// Direction reconstruction selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    /// Keep the upstream direction and core
    Upstream,
    /// Redo the geometry from image-axis intersections
    Intersection,
    /// Redo the direction with regression models (needs --models)
    Disp,
}

impl From<Method> for ReconstructionMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Upstream => ReconstructionMethod::Upstream,
            Method::Intersection => ReconstructionMethod::Intersection,
            Method::Disp => ReconstructionMethod::Disp,
        }
    }
}

/// Stereo reconstruction for Cherenkov telescope arrays.
#[derive(Parser)]
#[command(name = "stereorec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by `reconstruct` and `fill`.
#[derive(Args)]
struct RunArgs {
    /// Input event stream(s), JSON lines
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Telescope array configuration (JSON)
    #[arg(short, long)]
    array: PathBuf,

    /// Direction reconstruction method
    #[arg(short, long, value_enum, default_value = "upstream")]
    method: Method,

    /// Index of the upstream reconstruction in the event stream
    #[arg(long, default_value = "0")]
    method_index: usize,

    /// Minimum number of images
    #[arg(long, default_value = "2")]
    min_images: usize,

    /// Seed for random sub-sampling
    #[arg(long, requires = "keep_fraction")]
    seed: Option<u64>,

    /// Fraction of events kept by random sub-sampling
    #[arg(long, requires = "seed")]
    keep_fraction: Option<f64>,

    /// Stop after this span of event time (seconds)
    #[arg(long)]
    max_elapsed: Option<f64>,

    /// Spectral index of the simulated events
    #[arg(long, requires = "target_index")]
    generated_index: Option<f64>,

    /// Spectral index to re-weight to
    #[arg(long, requires = "generated_index")]
    target_index: Option<f64>,

    /// Simulated energy range (TeV) for re-weighting
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], default_values_t = [0.03, 200.0])]
    energy_range: Vec<f64>,
}

impl RunArgs {
    fn config(&self, mode: ProcessingMode) -> Result<RunConfig> {
        let mut config = RunConfig::new()
            .with_mode(mode)
            .with_method(self.method.into())
            .with_method_index(self.method_index)
            .with_min_images(self.min_images);
        if let (Some(seed), Some(keep)) = (self.seed, self.keep_fraction) {
            config = config.with_subsampling(seed, keep);
        }
        if let Some(seconds) = self.max_elapsed {
            config = config.with_max_elapsed_time(seconds);
        }
        if let (Some(generated), Some(target)) = (self.generated_index, self.target_index) {
            let (min, max) = match self.energy_range.as_slice() {
                [min, max] => (*min, *max),
                _ => (0.0, 0.0),
            };
            config = config.with_spectral_weighting(SpectralWeighting::new(
                generated, target, min, max,
            )?);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct events using filled lookup tables
    Reconstruct {
        #[command(flatten)]
        run: RunArgs,

        /// Output file (.csv or .jsonl)
        #[arg(short, long)]
        output: PathBuf,

        /// Lookup table file
        #[arg(short, long)]
        tables: PathBuf,

        /// Directory of regression model artifacts
        #[arg(long)]
        models: Option<PathBuf>,

        /// Maximum reconstructed offset from the camera center (degrees)
        #[arg(long)]
        max_wobble: Option<f64>,

        /// Minimum entries for a table bin to be used
        #[arg(long, default_value = "5")]
        min_entries: u64,
    },

    /// Fill lookup tables from simulated events
    Fill {
        #[command(flatten)]
        run: RunArgs,

        /// Output table file
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum true offset of filled events (degrees)
        #[arg(long, default_value = "0.0")]
        min_true_offset: f64,

        /// Maximum true offset of filled events (degrees)
        #[arg(long)]
        max_true_offset: Option<f64>,
    },

    /// Show the coverage of a lookup table file
    TableInfo {
        /// Lookup table file
        tables: PathBuf,

        /// Telescope array configuration, to list types without entries
        #[arg(short, long)]
        array: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Reconstruct {
            run,
            output,
            tables,
            models,
            max_wobble,
            min_entries,
        } => {
            let mut config = run
                .config(ProcessingMode::Read)?
                .with_lookup(LookupConfig { min_entries });
            if let Some(max_wobble) = max_wobble {
                config = config.with_max_wobble(max_wobble);
            }
            reconstruct(&run, &config, &output, &tables, models.as_deref())
        }
        Commands::Fill {
            run,
            output,
            min_true_offset,
            max_true_offset,
        } => {
            let config = run.config(ProcessingMode::Fill)?.with_fill_cuts(FillCuts {
                min_true_offset,
                max_true_offset: max_true_offset.unwrap_or(FillCuts::default().max_true_offset),
                ..FillCuts::default()
            });
            fill(&run, &config, &output)
        }
        Commands::TableInfo { tables, array } => table_info(&tables, array.as_deref()),
    }
}

/// Feeds one event stream through a processor. Returns true if the time
/// budget ended the run.
fn process_file(
    path: &Path,
    processor: &mut EventProcessor<'_>,
    mut writer: Option<&mut EventWriter>,
) -> Result<bool> {
    let reader = EventFileReader::open(path)?;
    for event in reader.events() {
        let event = event?;
        let outcome = processor.process(&event).map_err(|source| CliError::Event {
            path: path.to_path_buf(),
            source,
        })?;
        match outcome {
            EventOutcome::Accepted(record) => {
                if let Some(writer) = writer.as_deref_mut() {
                    writer.write(&record)?;
                }
            }
            EventOutcome::Rejected(_) => {}
            EventOutcome::Stop => {
                info!("time budget reached in {}", path.display());
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn reconstruct(
    run: &RunArgs,
    config: &RunConfig,
    output: &Path,
    tables: &Path,
    models: Option<&Path>,
) -> Result<()> {
    let array = stereorec_io::load_array_config(&run.array)?;
    let tables = stereorec_io::read_tables(tables)?;
    stereorec_io::report_missing_types(&tables, &array);
    let models = match models {
        Some(dir) => {
            let models = stereorec_io::load_models(dir)?;
            stereorec_io::report_missing_models(&models, &array);
            Some(models)
        }
        None => None,
    };
    if matches!(run.method, Method::Disp) && models.is_none() {
        warn!("disp method without --models, falling back to intersection");
    }

    let start = Instant::now();
    let mut processor = EventProcessor::new(&array, config, tables)?;
    if let Some(models) = &models {
        processor = processor.with_disp_models(models);
    }
    let mut writer = EventWriter::create(output)?;
    for path in &run.input {
        if process_file(path, &mut processor, Some(&mut writer))? {
            break;
        }
    }
    let written = writer.finish()?;
    let (summary, _) = processor.finish();
    finish_run(&summary, &stereorec_io::summary_path(output))?;

    println!(
        "Processed {} file(s) in {:.2}s, {} events written to {}",
        run.input.len(),
        start.elapsed().as_secs_f64(),
        written,
        output.display()
    );
    Ok(())
}

fn fill(run: &RunArgs, config: &RunConfig, output: &Path) -> Result<()> {
    let array = stereorec_io::load_array_config(&run.array)?;
    let start = Instant::now();
    let (summary, tables) = fill_tables(&run.input, &array, config, &TableLayout::default())?;

    stereorec_io::report_missing_types(&tables, &array);
    stereorec_io::write_tables(output, tables)?;
    finish_run(&summary, &stereorec_io::summary_path(output))?;

    println!(
        "Filled tables from {} file(s) in {:.2}s into {}",
        run.input.len(),
        start.elapsed().as_secs_f64(),
        output.display()
    );
    Ok(())
}

/// Fills tables from every input file.
///
/// Without a time budget the files are processed in parallel, one
/// processor per file, and merged; sums then depend on the merge order.
/// With a budget the files form one sequential run so the budget covers
/// the whole event-time span.
fn fill_tables(
    inputs: &[PathBuf],
    array: &TelescopeArray,
    config: &RunConfig,
    layout: &TableLayout,
) -> Result<(RunSummary, TableSet)> {
    if config.max_elapsed_time.is_some() {
        let mut processor = EventProcessor::new(array, config, TableSet::new(layout))?;
        for path in inputs {
            if process_file(path, &mut processor, None)? {
                break;
            }
        }
        return Ok(processor.finish());
    }

    let results = inputs
        .par_iter()
        .enumerate()
        .map(|(i, path)| fill_file(path, i, array, config, layout))
        .collect::<Result<Vec<_>>>()?;

    let mut merged: Option<(RunSummary, TableSet)> = None;
    for (summary, tables) in results {
        match merged.as_mut() {
            Some((all_summary, all_tables)) => {
                all_summary.merge(&summary);
                all_tables.merge(&tables)?;
            }
            None => merged = Some((summary, tables)),
        }
    }
    merged.ok_or(CliError::NoInput)
}

fn fill_file(
    path: &Path,
    index: usize,
    array: &TelescopeArray,
    config: &RunConfig,
    layout: &TableLayout,
) -> Result<(RunSummary, TableSet)> {
    let mut processor = EventProcessor::new(array, config, TableSet::new(layout))?;
    if let Some(sub) = config.subsampling {
        processor = processor.with_seed(sub.seed.wrapping_add(index as u64));
    }
    process_file(path, &mut processor, None)?;
    let (summary, tables) = processor.finish();
    info!(
        "{}: {} of {} events filled",
        path.display(),
        summary.cuts.survived,
        summary.cuts.total
    );
    Ok((summary, tables))
}

fn finish_run(summary: &RunSummary, path: &Path) -> Result<()> {
    println!("{}", summary.cuts);
    if let Some(dead_time) = &summary.dead_time {
        println!(
            "Dead time: {} events over {:.1}s, dead fraction {}",
            dead_time.n_events,
            dead_time.elapsed,
            dead_time
                .dead_fraction
                .map_or_else(|| "not computed".to_string(), |f| format!("{:.2}%", 100.0 * f))
        );
    }
    if summary.stopped_early {
        println!("Run stopped early on the time budget");
    }
    stereorec_io::write_summary(path, summary)?;
    info!("wrote run summary to {}", path.display());
    Ok(())
}

fn table_info(path: &Path, array: Option<&Path>) -> Result<()> {
    let tables = stereorec_io::read_tables(path)?;
    println!("File: {}", path.display());
    for target in TableTarget::ALL {
        let table = tables.get(target);
        println!("{} table: {} slices", target.name(), table.slice_count());
        println!(
            "  {:>8} {:>8} {:>8} {:>12} {:>12}",
            "type", "zenith", "noise", "filled bins", "entries"
        );
        for slice in table.coverage() {
            println!(
                "  {:>8} {:>8.1} {:>8.1} {:>12} {:>12}",
                slice.telescope_type.to_string(),
                slice.zenith,
                slice.noise,
                slice.filled_bins,
                slice.entries
            );
        }
    }
    if let Some(array) = array {
        let array = stereorec_io::load_array_config(array)?;
        let missing = stereorec_io::report_missing_types(&tables, &array);
        if missing.is_empty() {
            println!("All {} telescope types covered", array.types().count());
        }
    }
    Ok(())
}
