//! CLI entry point for segment telemetry collection.
//!
//! Polls bike-share station status and GTFS-realtime trip updates at a fixed
//! cadence, writing per-segment capacity and headway rows to CSV.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use segment_telemetry::config::Config;
use segment_telemetry::fetch::HttpFeedSource;
use segment_telemetry::output::CsvSink;
use segment_telemetry::probes::{CapacityProbe, HeadwayProbe};
use segment_telemetry::scheduler::{Probe, RunReport, Scheduler, Shutdown, TokioPacer};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "segment_telemetry")]
#[command(about = "Sample bike capacity and vehicle headways along transit line segments", long_about = None)]
struct Cli {
    /// JSON config file; omitted keys use the built-in Orange Line deployment
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(short = 'n', long, global = true)]
    ticks: Option<u32>,

    /// Seconds between tick starts
    #[arg(short = 'r', long, global = true)]
    interval_secs: Option<u64>,

    /// Per-request fetch timeout in seconds (5 to 8)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll station status and record bikes/capacity per segment
    Capacity {
        /// CSV file to append rows to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Poll trip updates and record headways at each boundary stop
    Headway {
        /// CSV file to append rows to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Poll both feeds concurrently, each on its own schedule
    Run,
    /// Fetch station information once and list each segment's stations
    Segments,
}

/// Colored stderr plus a JSON daily-rolling log file.
fn init_tracing() -> WorkerGuard {
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/segment_telemetry.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("segment_telemetry.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(ticks) = cli.ticks {
        config.ticks = ticks;
    }
    if let Some(interval) = cli.interval_secs {
        config.interval_secs = interval;
    }
    if let Some(timeout) = cli.timeout_secs {
        config.fetch_timeout_secs = timeout;
    }

    match cli.command {
        Commands::Capacity { output } => {
            if let Some(output) = output {
                config.capacity.output = output;
            }
            config.validate()?;
            let (_trigger, shutdown) = interrupt_signal();
            run_capacity(&config, shutdown).await?;
        }
        Commands::Headway { output } => {
            if let Some(output) = output {
                config.headway.output = output;
            }
            config.validate()?;
            let (_trigger, shutdown) = interrupt_signal();
            run_headway(&config, shutdown).await?;
        }
        Commands::Run => {
            config.validate()?;
            run_both(config).await?;
        }
        Commands::Segments => {
            config.validate()?;
            let source = HttpFeedSource::new(config.fetch_timeout())?;
            let mut probe = CapacityProbe::new(source, &config.capacity);
            probe.setup().await?;
        }
    }

    Ok(())
}

/// Cancels on Ctrl+C; the returned trigger can also cancel programmatically.
fn interrupt_signal() -> (Arc<watch::Sender<bool>>, Shutdown) {
    let (tx, shutdown) = Shutdown::channel();
    let tx = Arc::new(tx);
    let on_interrupt = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current tick");
            let _ = on_interrupt.send(true);
        }
    });
    (tx, shutdown)
}

#[tracing::instrument(skip_all, fields(output = %config.capacity.output.display()))]
async fn run_capacity(config: &Config, shutdown: Shutdown) -> Result<RunReport> {
    let source = HttpFeedSource::new(config.fetch_timeout())?;
    let probe = CapacityProbe::new(source, &config.capacity);
    drive(probe, &config.capacity.output, config, shutdown).await
}

#[tracing::instrument(skip_all, fields(output = %config.headway.output.display()))]
async fn run_headway(config: &Config, shutdown: Shutdown) -> Result<RunReport> {
    let source = HttpFeedSource::new(config.fetch_timeout())?;
    let probe = HeadwayProbe::new(source, &config.headway);
    drive(probe, &config.headway.output, config, shutdown).await
}

async fn drive<P: Probe>(
    mut probe: P,
    output: &Path,
    config: &Config,
    shutdown: Shutdown,
) -> Result<RunReport> {
    let sink = CsvSink::open(output, &probe.header())?;
    info!(
        ticks = config.ticks,
        interval_secs = config.interval_secs,
        probe = probe.name(),
        "Starting collection"
    );

    let mut scheduler = Scheduler::new(config.schedule(), TokioPacer::new(), shutdown);
    let report = scheduler
        .run(&mut probe, &sink)
        .await
        .with_context(|| format!("{} run aborted", probe.name()))?;

    info!(
        probe = probe.name(),
        ticks_completed = report.ticks_completed,
        failed_ticks = report.failed_ticks.len(),
        cancelled = report.cancelled,
        "Collection finished"
    );
    Ok(report)
}

/// Runs both feeds as independent tasks. A fatal error in one cancels the
/// other after its current tick.
async fn run_both(config: Config) -> Result<()> {
    let (trigger, shutdown) = interrupt_signal();
    let config = Arc::new(config);

    let capacity = {
        let (config, shutdown, trigger) = (config.clone(), shutdown.clone(), trigger.clone());
        tokio::spawn(async move {
            let result = run_capacity(&config, shutdown).await;
            if let Err(e) = &result {
                error!(error = %e, "Capacity collection failed");
                let _ = trigger.send(true);
            }
            result
        })
    };
    let headway = {
        let (config, trigger) = (config.clone(), trigger.clone());
        tokio::spawn(async move {
            let result = run_headway(&config, shutdown).await;
            if let Err(e) = &result {
                error!(error = %e, "Headway collection failed");
                let _ = trigger.send(true);
            }
            result
        })
    };

    let (capacity, headway) = tokio::join!(capacity, headway);
    capacity??;
    headway??;
    Ok(())
}
