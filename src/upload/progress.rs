//! Upload progress tracking and speed reporting
//!
//! [`ProgressState`] has a single writer, the upload loop. The
//! [`SpeedReporter`] task only ever sees a [`ProgressView`], which can take
//! snapshots but not change the counter.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between speed samples
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(500);

const MIB: f64 = 1024.0 * 1024.0;

struct Shared {
    transferred: AtomicU64,
    total: u64,
    started: Instant,
}

/// Bytes transferred so far plus the instant the upload started
pub struct ProgressState {
    shared: Arc<Shared>,
}

impl ProgressState {
    pub fn new(total: u64) -> Self {
        ProgressState {
            shared: Arc::new(Shared {
                transferred: AtomicU64::new(0),
                total,
                started: Instant::now(),
            }),
        }
    }

    /// Count `n` more acknowledged bytes
    pub fn record(&mut self, n: u64) {
        self.shared.transferred.fetch_add(n, Ordering::Release);
    }

    pub fn transferred(&self) -> u64 {
        self.shared.transferred.load(Ordering::Acquire)
    }

    /// Read-only handle for observers
    pub fn view(&self) -> ProgressView {
        ProgressView {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.view().snapshot()
    }
}

/// Read-only access to a [`ProgressState`]
#[derive(Clone)]
pub struct ProgressView {
    shared: Arc<Shared>,
}

impl ProgressView {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            transferred: self.shared.transferred.load(Ordering::Acquire),
            total: self.shared.total,
            elapsed: self.shared.started.elapsed(),
        }
    }
}

/// Point-in-time copy of the progress counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub transferred: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Average throughput since the start, in bytes per second
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.transferred as f64 / secs
        } else {
            0.0
        }
    }

    /// Average throughput in MB/s (MiB based)
    pub fn mb_per_sec(&self) -> f64 {
        self.bytes_per_sec() / MIB
    }

    /// Fraction done, 0.0 to 1.0
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.transferred as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Where progress samples are displayed
pub trait ProgressSink: Send + Sync {
    /// Called once before the first byte moves; `None` when the size is unknown
    fn start(&self, _total: Option<u64>) {}

    /// Called on every reporter tick
    fn update(&self, snapshot: &ProgressSnapshot);

    /// Called once after the upload returned
    fn finish(&self, _snapshot: &ProgressSnapshot, _success: bool) {}
}

/// Terminal progress bar with live speed in the description
pub struct ProgressBarSink {
    bar: ProgressBar,
    label: &'static str,
}

impl ProgressBarSink {
    /// Bar whose description reads "`label` (x.xx MB/s)"
    pub fn new(label: &'static str) -> Self {
        let style = ProgressStyle::with_template(
            "{msg} [{elapsed_precise}] [{bar:30}] {bytes}/{total_bytes} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_message(label);
        ProgressBarSink { bar, label }
    }
}

impl ProgressSink for ProgressBarSink {
    fn start(&self, total: Option<u64>) {
        match total {
            Some(total) => self.bar.set_length(total),
            None => {
                let style =
                    ProgressStyle::with_template("{spinner} {msg} [{elapsed_precise}] {bytes}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner());
                self.bar.set_style(style);
                self.bar.unset_length();
            }
        }
        self.bar.set_position(0);
    }

    fn update(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.transferred);
        self.bar
            .set_message(format!("{} ({:.2} MB/s)", self.label, snapshot.mb_per_sec()));
    }

    fn finish(&self, snapshot: &ProgressSnapshot, success: bool) {
        self.bar.set_position(snapshot.transferred);
        if success {
            self.bar.finish_with_message(format!(
                "{} done ({:.2} MB/s)",
                self.label,
                snapshot.mb_per_sec()
            ));
        } else {
            self.bar.abandon_with_message(format!("{} failed", self.label));
        }
    }
}

/// Progress as log lines, for non-interactive output
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn update(&self, snapshot: &ProgressSnapshot) {
        if snapshot.total == 0 {
            info!(
                "Transferred {} bytes ({:.2} MB/s)",
                snapshot.transferred,
                snapshot.mb_per_sec()
            );
            return;
        }
        info!(
            "Transferred {}/{} bytes ({:.1}%, {:.2} MB/s)",
            snapshot.transferred,
            snapshot.total,
            snapshot.fraction() * 100.0,
            snapshot.mb_per_sec()
        );
    }

    fn finish(&self, snapshot: &ProgressSnapshot, success: bool) {
        if success {
            info!(
                "Transfer finished in {:.1}s ({:.2} MB/s)",
                snapshot.elapsed.as_secs_f64(),
                snapshot.mb_per_sec()
            );
        }
    }
}

/// Discards all progress
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&self, _snapshot: &ProgressSnapshot) {}
}

/// Periodic task sampling a [`ProgressView`] into a [`ProgressSink`]
pub struct SpeedReporter;

impl SpeedReporter {
    /// Start sampling every `interval`
    pub fn spawn(
        view: ProgressView,
        sink: Arc<dyn ProgressSink>,
        interval: Duration,
    ) -> ReporterHandle {
        let stop = CancellationToken::new();
        let stopped = stop.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; there is nothing to show yet
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => sink.update(&view.snapshot()),
                }
            }
            debug!("Speed reporter stopped");
        });

        ReporterHandle {
            stop,
            task: Some(task),
        }
    }
}

/// Owner of a running reporter task
///
/// [`ReporterHandle::stop`] consumes the handle, so a reporter is stopped at
/// most once. A handle dropped without stopping aborts the task.
pub struct ReporterHandle {
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReporterHandle {
    /// Signal the task and wait for it to exit
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                // A failing display must not fail the upload
                warn!("Speed reporter ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.stop.cancel();
            task.abort();
        }
    }
}
