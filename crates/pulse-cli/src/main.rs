mod interactive;
mod output;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use output::OutputFormat;
use pulse_services::{
    collect_system_info, detect_gpu, MetricsStore, MonitorEvent, MonitorHandle, MonitorLoop,
    PulseConfig, SystemProbe,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONFIG_ENV: &str = "PULSE_CONFIG";

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Pulse - host resource monitor", long_about = None)]
struct Cli {
    /// JSON config file (defaults to $PULSE_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Metrics database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample host metrics until the duration elapses or Ctrl-C
    Run {
        /// Seconds between samples
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        interval: Option<u32>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Print stored metric records
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Delete every stored record
    Clear,

    /// Show system information and the detected GPU
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.db)?;

    match cli.command {
        Some(Commands::Run { interval, duration }) => cmd_run(config, interval, duration).await?,
        Some(Commands::List { output }) => cmd_list(&config, output)?,
        Some(Commands::Clear) => cmd_clear(&config)?,
        Some(Commands::Info) => cmd_info(&config),
        None => interactive::run(config).await?,
    }

    Ok(())
}

fn init_logging() -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(std::env::temp_dir(), "pulse.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // stderr keeps stdout clean for json/csv output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pulse_services=info,pulse_cli=info")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    guard
}

fn load_config(explicit: Option<&Path>, db: Option<PathBuf>) -> Result<PulseConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(PulseConfig::default_path);

    let mut config = PulseConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    debug!("Config resolved from {:?}", path);

    if let Some(db) = db {
        config.storage.db_path = Some(db);
    }
    Ok(config)
}

pub(crate) fn open_store(config: &PulseConfig) -> Result<Arc<MetricsStore>> {
    let path = config.storage.resolved_path();
    let store = MetricsStore::open(&path)
        .with_context(|| format!("Failed to open metrics database {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Detect the GPU and start the monitor loop on its own thread
pub(crate) async fn start_monitor(
    config: &PulseConfig,
    store: Arc<MetricsStore>,
    interval_secs: u32,
) -> Result<(MonitorHandle, JoinHandle<()>)> {
    let probe_config = config.clone();
    let probe = tokio::task::spawn_blocking(move || SystemProbe::from_config(&probe_config)).await?;

    match probe.gpu().identity() {
        Some(gpu) => println!("  GPU: {}", gpu),
        None => println!("  GPU: not detected, GPU load will read 0"),
    }

    let (monitor, handle) = MonitorLoop::new(probe, store, interval_secs)?;
    let worker = monitor.spawn_thread()?;
    Ok((handle, worker))
}

pub(crate) async fn stop_monitor(handle: &MonitorHandle, worker: JoinHandle<()>) -> Result<()> {
    if let Err(e) = handle.shutdown() {
        debug!("Monitor already closed: {}", e);
    }
    tokio::task::spawn_blocking(move || worker.join())
        .await?
        .map_err(|_| anyhow!("Monitor thread panicked"))
}

async fn cmd_run(config: PulseConfig, interval: Option<u32>, duration: Option<u64>) -> Result<()> {
    let store = open_store(&config)?;
    let interval = interval.unwrap_or(config.monitor.interval_secs);

    println!();
    println!("Monitoring every {}s (Ctrl-C to stop)", interval);
    let (handle, worker) = start_monitor(&config, store, interval).await?;
    let mut events = handle.subscribe();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
                cancel.cancel();
            }
        }
    });
    if let Some(secs) = duration {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            cancel.cancel();
        });
    }

    handle.start()?;
    println!();
    println!("  {}", output::table_header());
    println!("{:-<72}", "");

    let mut samples = 0usize;
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(MonitorEvent::Metrics(snapshot)) => {
                    samples += 1;
                    println!("\r  {}", output::snapshot_columns(&snapshot));
                }
                Ok(MonitorEvent::Tick(elapsed)) => {
                    print!("\r  elapsed {}", elapsed);
                    stdout.flush()?;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Display fell behind the monitor"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    let elapsed = handle.state().elapsed_text();
    stop_monitor(&handle, worker).await?;
    println!();
    println!("Stopped after {} with {} sample(s) stored", elapsed, samples);
    Ok(())
}

fn cmd_list(config: &PulseConfig, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let records = store.list_all();
    print!("{}", output::render_records(&records, format)?);
    Ok(())
}

fn cmd_clear(config: &PulseConfig) -> Result<()> {
    let store = open_store(config)?;
    if !store.clear() {
        anyhow::bail!("Failed to clear metrics database");
    }
    println!("Cleared all stored metrics");
    Ok(())
}

pub(crate) fn cmd_info(config: &PulseConfig) {
    let info = collect_system_info();

    println!();
    println!("System Information:");
    println!("{:-<40}", "");
    for line in info.display().lines() {
        println!("  {}", line);
    }
    match detect_gpu(&config.gpu) {
        Ok(gpu) => println!("  GPU: {}", gpu),
        Err(e) => println!("  GPU: not detected ({})", e),
    }
    println!("  Database: {}", config.storage.resolved_path().display());
    println!();
}
