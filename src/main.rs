//! # CSU Replay
//!
//! Reconstruct MOSFIRE CSU operational history from eavesdrop logs and
//! report how often bar moves ended in a fatal error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use csu_replay::config::{Config, LoggingConfig};
use csu_replay::csu::interval::Interval;
use csu_replay::replay::corpus::discover_logs;
use csu_replay::replay::replay_corpus;
use csu_replay::report::ReliabilityReport;
use csu_replay::table::{read_table, write_table, TableFormat};
use csu_replay::telemetry::Correlator;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "csu-replay", version, about)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip rotator telemetry lookups
    #[arg(long)]
    no_telemetry: bool,

    /// Replay logs even if the interval table already exists
    #[arg(long)]
    rebuild: bool,

    /// Log files or directories to replay (defaults to the configured log directory)
    paths: Vec<PathBuf>,
}

/// Main entry point for CSU Replay
///
/// # Control Flow
///
/// 1. Load configuration and set up logging
/// 2. Reuse the interval table if it exists, otherwise replay the corpus
///    and write the table
/// 3. Print the reliability report
///
/// # Errors
///
/// Returns error if:
/// - Configuration cannot be loaded or is invalid
/// - The log directory cannot be read
/// - The interval table cannot be read or written
///
/// # Examples
///
/// ```bash
/// csu-replay --config csu_replay.toml /s/sdata1300/logs/gui/eavesdrop
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let _guard = init_logging(&config.logging)?;

    info!("CSU Replay v{} starting...", env!("CARGO_PKG_VERSION"));

    let format: TableFormat = config.output.format.parse()?;
    let table_path = &config.output.table_path;

    let history = if should_reuse_table(&cli, &config, table_path) {
        info!("Reusing interval table {}", table_path.display());
        read_table(table_path, format)?
    } else {
        let history = replay(&cli, &config).await?;
        write_table(table_path, format, &history)
            .with_context(|| format!("Failed to write interval table {}", table_path.display()))?;
        history
    };

    let threshold = TimeDelta::seconds(config.report.prompt_failure_threshold_s as i64);
    println!("{}", ReliabilityReport::from_intervals(&history, threshold));

    Ok(())
}

/// Initialize tracing, writing to a file when one is configured
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// must be held until exit so buffered file output is flushed.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log filter")?;

    match &logging.file {
        Some(file) => {
            let dir = file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = file.file_name().context("Log file path has no file name")?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

/// An existing table is reused unless logs were named explicitly or a rebuild was requested
fn should_reuse_table(cli: &Cli, config: &Config, table_path: &Path) -> bool {
    config.output.reuse_existing && !cli.rebuild && cli.paths.is_empty() && table_path.is_file()
}

async fn replay(cli: &Cli, config: &Config) -> Result<Vec<Interval>> {
    let inputs = if cli.paths.is_empty() {
        vec![config.corpus.log_dir.clone()]
    } else {
        cli.paths.clone()
    };
    let logs = collect_inputs(&inputs, &config.corpus.extension)?;
    if logs.is_empty() {
        warn!("No log files found");
    }

    let correlator = if cli.no_telemetry {
        Correlator::disabled()
    } else {
        Correlator::from_config(&config.telemetry)?
    };
    if !correlator.is_enabled() {
        info!("Rotator telemetry disabled; rotator fields will be empty");
    }

    info!("Replaying {} log files", logs.len());
    Ok(replay_corpus(logs, correlator, config.corpus.max_parallel_files).await)
}

/// Expand directories into their log files; plain files are used as given
fn collect_inputs(inputs: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>> {
    let mut logs = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = discover_logs(input, extension)
                .with_context(|| format!("Failed to read log directory {}", input.display()))?;
            logs.extend(found);
        } else {
            logs.push(input.clone());
        }
    }
    Ok(logs)
}
