//! Fixed-count, fixed-cadence polling loop.
//!
//! A run moves through INIT (one-time [`Probe::setup`]), RUNNING (exactly
//! `ticks` calls to [`Probe::sample`]) and DONE (flush the sink, emit the
//! probe's run summary). The delay between tick starts is `interval`; time
//! spent inside a tick is subtracted from the following wait, and a tick
//! slower than `interval` is followed immediately by the next one.
//!
//! Fetch and decode failures stay inside their tick: the probe's empty row
//! is persisted instead and the run continues. Setup and sink failures end
//! the run. Cancellation is observed between ticks and interrupts the wait;
//! an in-flight tick always completes and the run still goes through DONE.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::TelemetryError;
use crate::output::RowSink;

/// How many ticks to run and how far apart their starts are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub ticks: u32,
    pub interval: Duration,
}

/// Clock and sleep used between ticks.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Monotonic time since the pacer was created.
    fn elapsed(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<P: Pacer + ?Sized> Pacer for Arc<P> {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

/// Real time, backed by tokio's timer.
pub struct TokioPacer {
    origin: tokio::time::Instant,
}

impl TokioPacer {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioPacer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pacer for TokioPacer {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated time: sleeping returns at once and advances the clock.
///
/// Lets many ticks run with no real delay, and records every requested wait.
#[derive(Default)]
pub struct ManualPacer {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward, e.g. to simulate a slow tick.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Pacer for ManualPacer {
    fn elapsed(&self) -> Duration {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Cooperative cancellation signal shared by every scheduler in a process.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns the trigger and a signal; `send(true)` cancels.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // trigger dropped without firing
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Identity of one tick.
#[derive(Debug, Clone)]
pub struct Tick {
    pub iteration: u32,
    pub timestamp: DateTime<Local>,
}

impl Tick {
    pub fn new(iteration: u32) -> Self {
        Self {
            iteration,
            timestamp: Local::now(),
        }
    }

    pub fn timestamp_text(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// One tick's result, ready for persistence and the console.
pub trait TelemetryRow {
    /// CSV fields, matching the probe's header.
    fn record(&self) -> Vec<String>;
    /// Emits the per-tick console banner.
    fn report(&self);
}

/// The feed-specific body of a tick.
#[async_trait]
pub trait Probe: Send {
    type Row: TelemetryRow + Send;

    fn name(&self) -> &'static str;

    fn header(&self) -> Vec<String>;

    /// One-time preparation; an error here aborts the run before any tick.
    async fn setup(&mut self) -> Result<(), TelemetryError>;

    async fn sample(&mut self, tick: &Tick) -> Result<Self::Row, TelemetryError>;

    /// Zero-valued row recorded when `sample` fails.
    fn empty(&self, tick: &Tick) -> Self::Row;

    /// Emits the whole-run summary.
    fn finish(&self);
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub ticks_completed: u32,
    pub failed_ticks: Vec<u32>,
    pub cancelled: bool,
}

pub struct Scheduler<P> {
    schedule: Schedule,
    pacer: P,
    shutdown: Shutdown,
}

impl<P: Pacer> Scheduler<P> {
    pub fn new(schedule: Schedule, pacer: P, shutdown: Shutdown) -> Self {
        Self {
            schedule,
            pacer,
            shutdown,
        }
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    #[tracing::instrument(skip_all, fields(probe = probe.name(), ticks = self.schedule.ticks))]
    pub async fn run<R, S>(&mut self, probe: &mut R, sink: &S) -> Result<RunReport, TelemetryError>
    where
        R: Probe,
        S: RowSink + ?Sized,
    {
        probe.setup().await?;

        let mut report = RunReport::default();
        let ticks = self.schedule.ticks;

        for iteration in 1..=ticks {
            if self.shutdown.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let started = self.pacer.elapsed();
            let tick = Tick::new(iteration);

            let row = match probe.sample(&tick).await {
                Ok(row) => row,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(iteration, error = %e, "Tick failed, recording empty metrics");
                    report.failed_ticks.push(iteration);
                    probe.empty(&tick)
                }
            };

            sink.append(&row.record())?;
            row.report();
            report.ticks_completed += 1;

            if iteration == ticks {
                break;
            }
            if self.shutdown.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let spent = self.pacer.elapsed().saturating_sub(started);
            let wait = self.schedule.interval.saturating_sub(spent);
            if wait.is_zero() {
                continue;
            }
            tokio::select! {
                _ = self.pacer.sleep(wait) => {}
                _ = self.shutdown.cancelled() => {
                    report.cancelled = true;
                    break;
                }
            }
        }

        sink.flush()?;
        if report.cancelled {
            info!(ticks_completed = report.ticks_completed, "Run cancelled");
        }
        probe.finish();

        Ok(report)
    }
}
