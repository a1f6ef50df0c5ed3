//! Replay simulator binary.
//!
//! Indexes a directory of shard extracts once at startup and copies one tick
//! (one file per shard) into the destination directory every interval, so
//! downstream pipelines see what looks like a live feed. `--once` copies a
//! single batch and exits, for cron-driven or test usage.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ingestion_corpus::CorpusIndexer;
use ingestion_dispatch::Dispatcher;
use ingestion_scheduling::BatchScheduler;
use runtime_cadence::{CadenceDriver, ReplayConfig, RunMode};
use storage_sink::FsSink;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code for a single-shot run whose batch was only partially copied.
const EXIT_PARTIAL: u8 = 2;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Simulate a realtime shard feed by replaying a historical corpus"
)]
struct Args {
    /// TOML config file; command-line flags take precedence over its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source directory containing all shard extracts.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Destination directory for realtime data (created if absent).
    #[arg(long)]
    dest: Option<PathBuf>,

    /// Number of shards (N); one batch copies N files.
    #[arg(long)]
    shards: Option<usize>,

    /// Interval in seconds between batches (T).
    #[arg(long)]
    interval: Option<u64>,

    /// Copy a single batch and exit.
    #[arg(long)]
    once: bool,

    #[arg(long, value_enum, default_value = "compact")]
    log_format: LogFormat,
}

impl Args {
    fn resolve(&self) -> Result<ReplayConfig> {
        let mut config = match &self.config {
            Some(path) => ReplayConfig::load(path)?,
            None => ReplayConfig::default(),
        };
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(dest) = &self.dest {
            config.destination = dest.clone();
        }
        if let Some(shards) = self.shards {
            config.shard_count = shards;
        }
        if let Some(interval) = self.interval {
            config.interval_secs = interval;
        }
        if self.once {
            config.mode = RunMode::SingleShot;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn run(config: ReplayConfig) -> Result<bool> {
    let indexer = CorpusIndexer::new(config.indexer_config());
    let corpus = indexer
        .index(&config.source)
        .context("indexing source corpus")?;
    let sink = FsSink::open(&config.destination)
        .with_context(|| format!("opening destination {}", config.destination.display()))?;
    let scheduler = BatchScheduler::new(corpus, config.shard_count);

    info!(
        source = %config.source.display(),
        destination = %config.destination.display(),
        shards = config.shard_count,
        interval = %humantime::format_duration(config.interval()),
        total_files = scheduler.corpus().len(),
        total_batches = scheduler.ticks_per_cycle(),
        "replay simulator initialised"
    );
    if scheduler.dropped_per_cycle() > 0 {
        warn!(
            dropped = scheduler.dropped_per_cycle(),
            "corpus size is not a multiple of the shard count; trailing files are skipped each cycle"
        );
    }

    let dispatcher = Dispatcher::new(Arc::new(sink));
    let mut driver = CadenceDriver::new(scheduler, dispatcher, config.interval());
    let cancel = CancellationToken::new();
    if config.mode == RunMode::Continuous {
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after the current batch");
                token.cancel();
            }
        });
    }

    let summary = driver.run(config.mode, cancel).await?;
    Ok(config.mode == RunMode::Continuous || summary.partial_ticks == 0)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    let result = args.resolve().and_then(|config| {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?
            .block_on(run(config))
    });
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_PARTIAL),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
