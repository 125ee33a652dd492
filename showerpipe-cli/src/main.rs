//! showerpipe: process air-shower event files through calibration,
//! image parameterization, stereo reconstruction, and output writing.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::{error, info, warn};
use thiserror::Error;

use showerpipe_algorithms::{Calibrator, ImageProcessor};
use showerpipe_core::{Error as CoreError, TelId};
use showerpipe_io::{DataWriter, EventSource, Hdf5EventSource, RunHeader};
use showerpipe_reco::ShowerProcessor;

use config::PipelineConfig;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    ShowerpipeIo(#[from] showerpipe_io::Error),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Reconstruct shower geometry from air-shower event files.
#[derive(Parser)]
#[command(name = "showerpipe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input file path (can be specified multiple times)
    #[arg(short = 'i', long = "input", required = true)]
    input: Vec<PathBuf>,

    /// Output file path, one per input
    #[arg(short = 'o', long = "output", required = true)]
    output: Vec<PathBuf>,

    /// JSON configuration file (defaults are used when absent)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Override the maximum leakage_intensity_width_2 in the
    /// reconstructor quality predicate
    #[arg(short = 'l', long = "max-leakage2")]
    max_leakage2: Option<f64>,

    /// Restrict processing to these telescope ids, e.g. "1,2,3"
    #[arg(short = 's', long = "subarray")]
    subarray: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match setup(&cli) {
        Ok((config, tel_selection)) => {
            run(&cli, &config, tel_selection.as_deref());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Validate arguments and configuration before touching any file.
fn setup(cli: &Cli) -> Result<(PipelineConfig, Option<Vec<TelId>>)> {
    if cli.input.len() != cli.output.len() {
        return Err(CliError::Usage(format!(
            "number of inputs ({}) must match number of outputs ({})",
            cli.input.len(),
            cli.output.len()
        )));
    }

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str::<PipelineConfig>(&text)?
        }
        None => PipelineConfig::default(),
    };

    if let Some(max_leakage2) = cli.max_leakage2 {
        config.shower_processor.hillas.image_query =
            format!("leakage_intensity_width_2 < {max_leakage2} && hillas_intensity > 100");
    }

    let tel_selection = cli
        .subarray
        .as_ref()
        .map(|list| {
            list.split(',')
                .map(|token| {
                    token.trim().parse::<TelId>().map_err(|_| {
                        CliError::Usage(format!("invalid telescope id \"{token}\""))
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    // Components are constructed once here so configuration problems
    // (bad query, unknown names) fail before any file is opened.
    Calibrator::new(&config.calibrator)?;
    ImageProcessor::new(config.image_processor.clone())?;
    ShowerProcessor::new(&config.shower_processor, None)?;

    Ok((config, tel_selection))
}

/// Process every input/output pair; per-file failures are reported and
/// skipped.
fn run(cli: &Cli, config: &PipelineConfig, tel_selection: Option<&[TelId]>) {
    for (input, output) in cli.input.iter().zip(&cli.output) {
        info!("processing {} -> {}", input.display(), output.display());
        match process_file(input, output, config, tel_selection) {
            Ok(stats) => info!(
                "finished {}: {} events ({} skipped) in {:.1}s",
                input.display(),
                stats.processed,
                stats.skipped,
                stats.elapsed.as_secs_f64()
            ),
            Err(err) => error!("failed {}: {err}", input.display()),
        }
    }
    info!("processing complete");
}

struct FileStats {
    processed: u64,
    skipped: u64,
    elapsed: std::time::Duration,
}

fn process_file(
    input: &PathBuf,
    output: &PathBuf,
    config: &PipelineConfig,
    tel_selection: Option<&[TelId]>,
) -> Result<FileStats> {
    let started = Instant::now();

    let mut source = Hdf5EventSource::open(input)?;
    if let Some(tel_ids) = tel_selection {
        source.select_telescopes(tel_ids);
    }
    let subarray = source.subarray().clone();

    let simulation_config = source.simulation_config().cloned();
    let atmosphere_model = source.atmosphere_model().cloned();
    let metaparam = source.metaparam().clone();

    let calibrator = Calibrator::new(&config.calibrator)?;
    let mut image_processor = ImageProcessor::new(config.image_processor.clone())?;
    let shower_processor =
        ShowerProcessor::new(&config.shower_processor, atmosphere_model.clone())?;

    let header = RunHeader {
        subarray: &subarray,
        simulation_config: simulation_config.as_ref(),
        atmosphere_model: atmosphere_model.as_ref(),
        metaparam: &metaparam,
    };
    let mut data_writer = DataWriter::new(config.data_writer.clone(), output, &header)?;

    let mut processed = 0u64;
    let mut skipped = 0u64;
    for event in source.by_ref() {
        let mut event = event?;
        let event_id = event.event_id;

        match calibrator.apply(&subarray, &mut event) {
            Ok(()) => {}
            Err(CoreError::Event(reason)) => {
                warn!("event {event_id} skipped: {reason}");
                skipped += 1;
                continue;
            }
            // Invariant violations abort the file.
            Err(err) => return Err(err.into()),
        }

        image_processor.apply(&subarray, &mut event);
        shower_processor.apply(&subarray, &mut event);
        data_writer.apply(&event)?;
        processed += 1;
    }

    data_writer.write_shower_array(source.shower_array())?;
    data_writer.close()?;

    Ok(FileStats {
        processed,
        skipped,
        elapsed: started.elapsed(),
    })
}
