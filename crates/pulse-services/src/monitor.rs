//! Sampling loop.
//!
//! One task owns the session state and selects over the command channel, the
//! sampling interval and the one-second elapsed-time ticker, so cycles never
//! overlap. Front ends talk to it through a [`MonitorHandle`] and receive
//! [`MonitorEvent`]s over a broadcast channel.

use chrono::Local;
use pulse_core::{format_elapsed, MetricsSnapshot, PulseConfig};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Builder;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::gpu_load::GpuLoadReader;
use crate::host_metrics::HostMetricsReader;
use crate::store::MetricsStore;

const TICK_PERIOD: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Sampling interval must be at least one second")]
    InvalidInterval,
    #[error("Monitor loop is not running")]
    Closed,
    #[error("Failed to start monitor thread: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct ProbeError(pub String);

/// Figures gathered for one cycle. CPU and RAM are mandatory; disk and GPU
/// are already soft-failed to zero by their readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSample {
    pub cpu_percent: Option<f64>,
    pub ram_free_mb: Option<f64>,
    pub ram_total_mb: Option<f64>,
    pub disk_free_gb: f64,
    pub disk_total_gb: f64,
    pub gpu_load: f64,
}

/// Source of raw metrics for each sampling cycle
pub trait MetricsProbe: Send + 'static {
    fn sample(&mut self) -> Result<RawSample, ProbeError>;
}

/// Production probe backed by OS counters, the disk command and the GPU reader
pub struct SystemProbe {
    host: HostMetricsReader,
    gpu: GpuLoadReader,
}

impl SystemProbe {
    pub fn new(host: HostMetricsReader, gpu: GpuLoadReader) -> Self {
        Self { host, gpu }
    }

    /// Build from config, detecting the GPU once
    pub fn from_config(config: &PulseConfig) -> Self {
        Self::new(
            HostMetricsReader::new(config.disk.clone()),
            GpuLoadReader::detect(&config.gpu),
        )
    }

    pub fn gpu(&self) -> &GpuLoadReader {
        &self.gpu
    }
}

impl MetricsProbe for SystemProbe {
    fn sample(&mut self) -> Result<RawSample, ProbeError> {
        let cpu_percent = self.host.cpu_percent();
        let (ram_free_mb, ram_total_mb) = self.host.read_ram();
        let (disk_free_gb, disk_total_gb) = self.host.read_disk();
        let gpu_load = self.gpu.read_load();

        Ok(RawSample {
            cpu_percent,
            ram_free_mb: Some(ram_free_mb),
            ram_total_mb: Some(ram_total_mb),
            disk_free_gb,
            disk_total_gb,
            gpu_load,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// A snapshot that was validated and persisted
    Metrics(MetricsSnapshot),
    /// Elapsed session time as `MM:SS`, once per second while running
    Tick(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub running: bool,
    pub started_at: Option<Instant>,
    pub interval_secs: u32,
}

impl SessionState {
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    pub fn elapsed_text(&self) -> String {
        format_elapsed(self.elapsed())
    }
}

#[derive(Debug)]
enum Command {
    Start,
    Stop,
    SetInterval(u32),
    Clear(oneshot::Sender<bool>),
    Shutdown,
}

/// Cloneable handle for driving the monitor loop
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<MonitorEvent>,
    state: watch::Receiver<SessionState>,
}

impl MonitorHandle {
    pub fn start(&self) -> Result<(), MonitorError> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<(), MonitorError> {
        self.send(Command::Stop)
    }

    pub fn set_interval(&self, seconds: u32) -> Result<(), MonitorError> {
        if seconds == 0 {
            return Err(MonitorError::InvalidInterval);
        }
        self.send(Command::SetInterval(seconds))
    }

    /// Stop monitoring and delete every stored record
    pub async fn clear(&self) -> Result<bool, MonitorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Clear(tx))?;
        rx.await.map_err(|_| MonitorError::Closed)
    }

    /// [`clear`](Self::clear) for callers outside the runtime
    pub fn blocking_clear(&self) -> Result<bool, MonitorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Clear(tx))?;
        rx.blocking_recv().map_err(|_| MonitorError::Closed)
    }

    pub fn shutdown(&self) -> Result<(), MonitorError> {
        self.send(Command::Shutdown)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    fn send(&self, command: Command) -> Result<(), MonitorError> {
        self.commands.send(command).map_err(|_| MonitorError::Closed)
    }
}

pub struct MonitorLoop<P: MetricsProbe> {
    probe: P,
    store: Arc<MetricsStore>,
    state: SessionState,
    sampling: Option<Interval>,
    ticker: Option<Interval>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<MonitorEvent>,
    state_tx: watch::Sender<SessionState>,
}

impl<P: MetricsProbe> MonitorLoop<P> {
    pub fn new(
        probe: P,
        store: Arc<MetricsStore>,
        interval_secs: u32,
    ) -> Result<(Self, MonitorHandle), MonitorError> {
        if interval_secs == 0 {
            return Err(MonitorError::InvalidInterval);
        }

        let state = SessionState {
            running: false,
            started_at: None,
            interval_secs,
        };
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(state);

        let handle = MonitorHandle {
            commands: command_tx,
            events: events.clone(),
            state: state_rx,
        };

        let monitor = Self {
            probe,
            store,
            state,
            sampling: None,
            ticker: None,
            commands,
            events,
            state_tx,
        };

        Ok((monitor, handle))
    }

    /// Run on a dedicated thread with its own single-threaded runtime
    pub fn spawn_thread(self) -> Result<thread::JoinHandle<()>, MonitorError> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let join = thread::Builder::new()
            .name("pulse-monitor".to_string())
            .spawn(move || runtime.block_on(self.run()))?;
        Ok(join)
    }

    pub async fn run(mut self) {
        info!(interval_secs = self.state.interval_secs, "Monitor loop ready");

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).is_break() {
                        break;
                    }
                }
                _ = next_tick(&mut self.sampling) => self.sample_cycle(),
                _ = next_tick(&mut self.ticker) => self.emit_tick(),
            }
        }

        self.stop();
        info!("Monitor loop exited");
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        debug!(?command, "Monitor command");
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::SetInterval(seconds) => self.set_interval(seconds),
            Command::Clear(reply) => {
                self.stop();
                let _ = reply.send(self.store.clear());
            }
            Command::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn start(&mut self) {
        if self.state.running {
            debug!("Monitoring already running");
            return;
        }

        let period = Duration::from_secs(u64::from(self.state.interval_secs));
        match (arm(period), arm(TICK_PERIOD)) {
            (Ok(sampling), Ok(ticker)) => {
                self.sampling = Some(sampling);
                self.ticker = Some(ticker);
                self.state.running = true;
                self.state.started_at = Some(Instant::now());
                self.publish();
                info!(interval_secs = self.state.interval_secs, "Monitoring started");
            }
            (Err(e), _) | (_, Err(e)) => {
                self.sampling = None;
                self.ticker = None;
                error!("Failed to start monitoring: {}", e);
            }
        }
    }

    fn stop(&mut self) {
        if !self.state.running {
            debug!("Monitoring already stopped");
            return;
        }

        self.sampling = None;
        self.ticker = None;
        self.state.running = false;
        self.state.started_at = None;
        self.publish();
        info!("Monitoring stopped");
    }

    fn set_interval(&mut self, seconds: u32) {
        if seconds == 0 {
            warn!("Ignoring zero sampling interval");
            return;
        }

        self.state.interval_secs = seconds;
        if self.state.running {
            match arm(Duration::from_secs(u64::from(seconds))) {
                Ok(sampling) => self.sampling = Some(sampling),
                Err(e) => error!("Failed to re-arm sampling timer: {}", e),
            }
        }
        self.publish();
        info!(interval_secs = seconds, "Sampling interval updated");
    }

    #[instrument(skip(self), fields(interval_secs = self.state.interval_secs))]
    fn sample_cycle(&mut self) {
        if !self.state.running {
            return;
        }

        let raw = match self.probe.sample() {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to gather system metrics: {}", e);
                return;
            }
        };

        let Some(snapshot) = self.assemble(raw) else {
            return;
        };

        if !self.store.append(&snapshot) {
            warn!("Snapshot was not persisted");
            return;
        }

        debug!(
            cpu = snapshot.cpu_percent,
            gpu = snapshot.gpu_load,
            elapsed = %snapshot.monitoring_time,
            "Metrics sampled"
        );
        let _ = self.events.send(MonitorEvent::Metrics(snapshot));
    }

    fn assemble(&self, raw: RawSample) -> Option<MetricsSnapshot> {
        let (Some(cpu_percent), Some(ram_free_mb), Some(ram_total_mb)) =
            (raw.cpu_percent, raw.ram_free_mb, raw.ram_total_mb)
        else {
            error!(
                cpu = ?raw.cpu_percent,
                ram_free = ?raw.ram_free_mb,
                ram_total = ?raw.ram_total_mb,
                "Core metrics unavailable, skipping cycle"
            );
            return None;
        };

        Some(MetricsSnapshot {
            time_lapse: self.state.interval_secs,
            captured_on: Local::now().date_naive(),
            monitoring_time: self.state.elapsed_text(),
            cpu_percent,
            gpu_load: raw.gpu_load,
            ram_free_mb,
            ram_total_mb,
            disk_free_gb: raw.disk_free_gb,
            disk_total_gb: raw.disk_total_gb,
        })
    }

    fn emit_tick(&mut self) {
        if !self.state.running {
            return;
        }
        let _ = self.events.send(MonitorEvent::Tick(self.state.elapsed_text()));
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state);
    }
}

/// Periodic timer whose first tick is one period away
fn arm(period: Duration) -> Result<Interval, MonitorError> {
    if period.is_zero() {
        return Err(MonitorError::InvalidInterval);
    }
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Ok(interval)
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
