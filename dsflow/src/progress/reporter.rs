//! Background progress reporting for long-running steps.

use super::ProgressSampler;
use crate::cancellation::CancellationToken;
use crate::context::{ProgressSlot, StepContext};
use crate::events::{types, EventSink};
use crate::utils::duration_ms;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Default sampling interval.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Samples progress on a fixed interval and publishes it as `step.progress`
/// events.
///
/// The reporter runs as its own tokio task. Sampling failures, panics
/// included, are logged and counted; they never reach the step being
/// monitored and sampling continues until the reporter is stopped.
#[derive(Clone)]
pub struct ProgressReporter {
    sampler: Arc<dyn ProgressSampler>,
    interval: Duration,
}

impl ProgressReporter {
    /// Creates a reporter. A zero interval is raised to one millisecond.
    #[must_use]
    pub fn new(sampler: Arc<dyn ProgressSampler>, interval: Duration) -> Self {
        Self {
            sampler,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Returns the sampling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts reporting for the step running in `ctx`.
    ///
    /// Events carry the run and step identity, and each sample becomes the
    /// step's [`StepContext::last_progress`]. The reporter also stops when
    /// the run is cancelled.
    #[must_use]
    pub fn track(&self, ctx: &StepContext) -> ProgressHandle {
        let mut labels = serde_json::Map::new();
        ctx.identity().annotate(&mut labels);
        labels.insert("step".to_string(), serde_json::json!(ctx.step_name()));
        self.spawn(Target {
            sink: ctx.event_sink().clone(),
            labels,
            cancellation: Some(ctx.cancellation().clone()),
            slot: Some(ctx.progress_slot()),
        })
    }

    /// Starts reporting to `sink`, merging `labels` into every event.
    #[must_use]
    pub fn track_with(
        &self,
        sink: Arc<dyn EventSink>,
        labels: serde_json::Map<String, serde_json::Value>,
    ) -> ProgressHandle {
        self.spawn(Target {
            sink,
            labels,
            cancellation: None,
            slot: None,
        })
    }

    /// Runs `future` with a reporter attached to `ctx`, stopping the reporter
    /// once the future completes.
    ///
    /// If the returned future is dropped early the reporter is aborted.
    pub async fn scope<F>(&self, ctx: &StepContext, future: F) -> F::Output
    where
        F: Future,
    {
        let handle = self.track(ctx);
        let output = future.await;
        handle.stop().await;
        output
    }

    fn spawn(&self, target: Target) -> ProgressHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let stats = Arc::new(ReporterStats::default());
        let task = tokio::spawn(report_loop(
            self.sampler.clone(),
            self.interval,
            target,
            stop_rx,
            stats.clone(),
        ));
        debug!(interval_ms = duration_ms(self.interval), "progress reporter started");

        ProgressHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
            stats,
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Where a reporter publishes its samples.
struct Target {
    sink: Arc<dyn EventSink>,
    labels: serde_json::Map<String, serde_json::Value>,
    cancellation: Option<Arc<CancellationToken>>,
    slot: Option<ProgressSlot>,
}

#[derive(Debug, Default)]
struct ReporterStats {
    emitted: AtomicU64,
    failures: AtomicU64,
}

/// Counters of a stopped reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSummary {
    /// Samples published.
    pub samples_emitted: u64,
    /// Sampler calls that failed.
    pub failures: u64,
}

/// Owns a running reporter task.
///
/// [`ProgressHandle::stop`] stops the task and waits for it. Dropping the
/// handle without stopping aborts the task.
#[derive(Debug)]
pub struct ProgressHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    stats: Arc<ReporterStats>,
}

impl ProgressHandle {
    /// Samples published so far.
    #[must_use]
    pub fn samples_emitted(&self) -> u64 {
        self.stats.emitted.load(Ordering::SeqCst)
    }

    /// Failed sampler calls so far.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.stats.failures.load(Ordering::SeqCst)
    }

    /// Returns true once the reporter task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the reporter and waits for its task to exit.
    pub async fn stop(mut self) -> ProgressSummary {
        if let Some(tx) = self.stop_tx.take() {
            // the task may already have exited on cancellation
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "progress reporter task ended abnormally");
            }
        }
        debug!(
            samples = self.samples_emitted(),
            failures = self.failures(),
            "progress reporter stopped"
        );
        ProgressSummary {
            samples_emitted: self.samples_emitted(),
            failures: self.failures(),
        }
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn report_loop(
    sampler: Arc<dyn ProgressSampler>,
    interval: Duration,
    target: Target,
    mut stop_rx: oneshot::Receiver<()>,
    stats: Arc<ReporterStats>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let cancelled = async {
        match &target.cancellation {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(cancelled);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            () = &mut cancelled => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            () = &mut cancelled => break,
            result = AssertUnwindSafe(sampler.sample()).catch_unwind() => result,
        };

        match result {
            Ok(Ok(sample)) => {
                let mut data = sample.to_event_data();
                if let serde_json::Value::Object(ref mut map) = data {
                    for (key, value) in &target.labels {
                        map.insert(key.clone(), value.clone());
                    }
                }
                if let Some(slot) = &target.slot {
                    *slot.lock() = Some(sample);
                }
                target.sink.try_emit(types::STEP_PROGRESS, Some(data));
                stats.emitted.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                stats.failures.fetch_add(1, Ordering::SeqCst);
                warn!("exception in progress sampler: {e}");
            }
            Err(panic) => {
                stats.failures.fetch_add(1, Ordering::SeqCst);
                warn!("progress sampler panicked: {}", panic_message(&*panic));
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
