//! scintrec: scintillator paddle reconstruction from the command line.
//!
//! Reads a calibration database and a JSON-lines event file, runs the
//! per-event pipeline and writes one record per paddle hit.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Parser, Subcommand, ValueEnum};
use scintrec_algorithms::{reconstruct_events, Reconstructor};
use scintrec_core::{CalibrationDatabase, ChannelBuffer, VariableView};
use scintrec_io::{EventFileReader, HitFileWriter, OutputFormat};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    ScintrecIo(#[from] scintrec_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] scintrec_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Output file layout.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// One CSV row per paddle hit
    Csv,
    /// One JSON object per event
    Jsonl,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => OutputFormat::Csv,
            Format::Jsonl => OutputFormat::JsonLines,
        }
    }
}

/// Scintillator paddle hit reconstruction.
#[derive(Parser)]
#[command(name = "scintrec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct paddle hits from an event file
    Process {
        /// Input event file (JSON lines)
        events: PathBuf,

        /// Calibration file or epoch database
        #[arg(short, long)]
        calibration: PathBuf,

        /// Run number used to pick the calibration epoch
        #[arg(short, long, default_value = "0")]
        run: u32,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: Format,

        /// Reconstruct events on the rayon thread pool
        #[arg(long)]
        parallel: bool,

        /// Worker threads for --parallel (default: all cores)
        #[arg(long)]
        threads: Option<usize>,

        /// Events per parallel work unit
        #[arg(long, default_value = "1024")]
        chunk_size: usize,
    },

    /// Summarize the calibration in effect for a run
    Info {
        /// Calibration file or epoch database
        calibration: PathBuf,

        /// Run number
        #[arg(short, long, default_value = "0")]
        run: u32,
    },

    /// List the exported per-event variables
    Variables {
        /// Calibration file or epoch database
        calibration: PathBuf,

        /// Run number
        #[arg(short, long, default_value = "0")]
        run: u32,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Process {
            events,
            calibration,
            run,
            output,
            format,
            parallel,
            threads,
            chunk_size,
        } => {
            let calibration = CalibrationDatabase::from_file(&calibration)?.for_run(run)?;
            let reader = EventFileReader::open(&events)?;
            let mut writer = HitFileWriter::create(&output, format.into())?;
            let start = Instant::now();
            let mut total_hits = 0usize;

            if parallel {
                let events = reader.read_all()?;
                let mut builder = rayon::ThreadPoolBuilder::new();
                if let Some(threads) = threads {
                    builder = builder.num_threads(threads);
                }
                let pool = builder.build()?;
                let summaries =
                    pool.install(|| reconstruct_events(&calibration, &events, chunk_size))?;
                total_hits = summaries.iter().map(|s| s.n_hit).sum();
                writer.write_events(&summaries)?;
            } else {
                let mut reconstructor = Reconstructor::with_calibration(Arc::clone(&calibration))?;
                for event in reader.events() {
                    reconstructor.process_event(&event?)?;
                    let summary = reconstructor.summary()?;
                    total_hits += summary.n_hit;
                    writer.write_event(&summary)?;
                }
            }
            writer.flush()?;

            tracing::info!(
                events = writer.events_written(),
                hits = total_hits,
                elapsed_ms = start.elapsed().as_millis(),
                output = %output.display(),
                "reconstruction finished"
            );
        }

        Commands::Info { calibration, run } => {
            let database = CalibrationDatabase::from_file(&calibration)?;
            let cal = database.for_run(run)?;

            println!("Calibration: {}", calibration.display());
            println!("Epochs: {}", database.epochs().len());
            for epoch in database.epochs() {
                let last = epoch
                    .last_run
                    .map_or_else(|| "open".to_string(), |r| r.to_string());
                println!("  runs {}..={}", epoch.first_run, last);
            }
            println!("Run {run}:");
            println!("  Paddles: {}", cal.n_paddles);
            println!("  TDC conversion: {}", cal.tdc_to_time);
            println!("  Speed in material: {}", cal.speed_in_material);
            println!("  Attenuation: {}", cal.attenuation);
            println!("  MIP amplitude: {}", cal.adc_mip);
            println!("  Resolution: {}", cal.resolution);
            println!("  Timewalk parameters: {}", cal.timewalk.len());
            println!("  Amplitude combination: {:?}", cal.amplitude_combination);
            println!(
                "  FADC window: {} samples, {} pedestal, threshold {} ({})",
                cal.fadc.window,
                cal.fadc.n_pedestal,
                cal.fadc.threshold,
                if cal.fadc.threshold_mode { "on" } else { "off" }
            );
        }

        Commands::Variables { calibration, run } => {
            let cal = CalibrationDatabase::from_file(&calibration)?.for_run(run)?;
            let buffer = ChannelBuffer::new(cal.n_paddles)?;
            for variable in buffer.variables() {
                let kind = match variable.view {
                    VariableView::Float(_) => "float",
                    VariableView::Count(_) => "count",
                    VariableView::Flag(_) => "flag",
                    VariableView::Index(_) => "index",
                    VariableView::Scalar(_) => "scalar",
                };
                let length = match variable.view {
                    VariableView::Scalar(_) => "1".to_string(),
                    VariableView::Index(_) | VariableView::Count(_)
                        if variable.name.starts_with("hit_") =>
                    {
                        "nhit".to_string()
                    }
                    view => view.len().to_string(),
                };
                println!(
                    "{:<12} {:<7} {:>5}  {}",
                    variable.name, kind, length, variable.description
                );
            }
        }
    }

    Ok(())
}
