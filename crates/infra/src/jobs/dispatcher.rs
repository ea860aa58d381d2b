//! Dispatcher loop: dequeue, trigger the pipeline, reconcile status.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use drtrigger_core::{DomainError, JobId};

use super::store::{decode_job, JobStore, JobStoreError};
use crate::trigger::PipelineTrigger;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long one blocking dequeue waits for a job
    pub dequeue_timeout: Duration,
    /// Pause after a dequeue that returned nothing
    pub idle_backoff: Duration,
    /// Pause after a store-level or unexpected error
    pub error_backoff: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout: Duration::from_secs(5),
            idle_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            name: "dr-dispatcher".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, idle: Duration, error: Duration) -> Self {
        self.idle_backoff = idle;
        self.error_backoff = error;
        self
    }
}

/// Dispatcher runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DispatcherStats {
    pub jobs_dispatched: u64,
    pub jobs_triggered: u64,
    pub jobs_failed: u64,
    pub jobs_discarded: u64,
    pub loop_errors: u64,
    pub uptime_secs: u64,
}

/// Handle to control a running dispatcher.
#[derive(Debug)]
pub struct DispatcherHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<DispatcherStats>>,
}

impl DispatcherHandle {
    /// Request shutdown and wait for the loop to exit. A dispatch already in
    /// flight is finished and reconciled first.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "dispatcher task ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        read_stats(&self.stats)
    }
}

/// What happened to one dequeued entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Triggered { job_id: JobId, status: u16 },
    Failed { job_id: JobId, error: String },
    /// Entry was dropped without calling the pipeline (unreadable, or already terminal).
    Discarded { reason: String },
}

/// Errors that escape per-job handling and pause the loop.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("dispatch task aborted: {0}")]
    Aborted(String),
}

/// Single-consumer dispatcher.
///
/// Each dequeued job is dispatched exactly once: no retry, no re-queue. The
/// outcome lands in the status table, and the processing marker is cleared
/// once that write succeeded.
pub struct Dispatcher<S: JobStore> {
    store: S,
    trigger: Arc<dyn PipelineTrigger>,
}

impl<S: JobStore + 'static> Dispatcher<S> {
    pub fn new(store: S, trigger: Arc<dyn PipelineTrigger>) -> Self {
        Self { store, trigger }
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(self, config: DispatcherConfig, cancel: CancellationToken) -> DispatcherHandle {
        let stats = Arc::new(Mutex::new(DispatcherStats::default()));
        let join = tokio::spawn(dispatcher_loop(Arc::new(self), config, cancel.clone(), stats.clone()));

        DispatcherHandle {
            cancel,
            join: Some(join),
            stats,
        }
    }

    /// One iteration without any backoff sleep: wait up to `timeout` for an
    /// entry and dispatch it. `Ok(None)` means the queue stayed empty.
    pub async fn process_next(&self, timeout: Duration) -> Result<Option<DispatchOutcome>, DispatcherError> {
        match self.store.dequeue_blocking(timeout).await? {
            Some(raw) => self.dispatch_raw(&raw).await.map(Some),
            None => Ok(None),
        }
    }

    /// Dispatch one raw queue entry.
    pub async fn dispatch_raw(&self, raw: &str) -> Result<DispatchOutcome, DispatcherError> {
        let mut job = match decode_job(raw) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "dropping unreadable queue entry");
                return Ok(DispatchOutcome::Discarded {
                    reason: format!("unreadable queue entry: {e}"),
                });
            }
        };

        if job.is_terminal() {
            warn!(job_id = %job.id, status = %job.status(), "dropping queue entry that is already terminal");
            return Ok(DispatchOutcome::Discarded {
                reason: format!("job {} is already {}", job.id, job.status()),
            });
        }

        // The marker is only a breadcrumb; the entry is already off the queue,
        // so a failed write must not stop the dispatch.
        let marked = match self.store.mark_processing(raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "failed to mark job as processing");
                false
            }
        };

        info!(job_id = %job.id, mode = self.trigger.mode(), "dispatching job");

        let outcome = match self.trigger.trigger(&job).await {
            Ok(receipt) => {
                job.mark_triggered(receipt.status, Utc::now())?;
                info!(job_id = %job.id, status = receipt.status, "job triggered");
                DispatchOutcome::Triggered {
                    job_id: job.id.clone(),
                    status: receipt.status,
                }
            }
            Err(e) => {
                let message = e.to_string();
                job.mark_failed(message.clone(), Utc::now())?;
                error!(job_id = %job.id, error = %message, "job dispatch failed");
                DispatchOutcome::Failed {
                    job_id: job.id.clone(),
                    error: message,
                }
            }
        };

        // Without a status record the marker is the only trace of the job;
        // it stays so startup recovery can requeue it.
        self.store.set_status(&job).await?;

        if marked {
            if let Err(e) = self.store.unmark_processing(raw).await {
                warn!(job_id = %job.id, error = %e, "failed to clear processing marker");
            }
        }

        Ok(outcome)
    }

    /// Reconcile an entry whose dispatch task panicked: record it as failed
    /// unless a terminal status already landed, then clear its marker.
    async fn record_aborted(&self, raw: &str, reason: &str) -> Result<Option<JobId>, DispatcherError> {
        let Ok(mut job) = decode_job(raw) else {
            return Ok(None);
        };

        let finished = self
            .store
            .get_status(&job.id)
            .await?
            .is_some_and(|stored| stored.is_terminal());
        if !finished {
            job.mark_failed(format!("dispatch aborted: {reason}"), Utc::now())?;
            self.store.set_status(&job).await?;
        }

        self.store.unmark_processing(raw).await?;
        Ok((!finished).then_some(job.id))
    }
}

async fn dispatcher_loop<S: JobStore + 'static>(
    dispatcher: Arc<Dispatcher<S>>,
    config: DispatcherConfig,
    cancel: CancellationToken,
    stats: Arc<Mutex<DispatcherStats>>,
) {
    info!(dispatcher = %config.name, mode = dispatcher.trigger.mode(), "dispatcher started");
    let start_time = Instant::now();

    // The dequeue itself is never raced against cancellation: an entry popped
    // by the store must reach dispatch_raw, or it would be lost.
    while !cancel.is_cancelled() {
        update_stats(&stats, |s| s.uptime_secs = start_time.elapsed().as_secs());

        let raw = match dispatcher.store.dequeue_blocking(config.dequeue_timeout).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(dispatcher = %config.name, "queue empty");
                sleep_or_cancel(&cancel, config.idle_backoff).await;
                continue;
            }
            Err(e) => {
                error!(dispatcher = %config.name, error = %e, "dequeue failed");
                update_stats(&stats, |s| s.loop_errors += 1);
                sleep_or_cancel(&cancel, config.error_backoff).await;
                continue;
            }
        };

        // Own task, so a panic in the trigger surfaces as a JoinError here
        // instead of taking the loop down.
        let task = {
            let dispatcher = dispatcher.clone();
            let raw = raw.clone();
            tokio::spawn(async move { dispatcher.dispatch_raw(&raw).await })
        };
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                let reason = e.to_string();
                match dispatcher.record_aborted(&raw, &reason).await {
                    Ok(Some(job_id)) => {
                        error!(dispatcher = %config.name, job_id = %job_id, "dispatch aborted; job marked failed");
                        update_stats(&stats, |s| {
                            s.jobs_dispatched += 1;
                            s.jobs_failed += 1;
                        });
                    }
                    Ok(None) => {}
                    Err(err) => {
                        error!(dispatcher = %config.name, error = %err, "failed to record aborted dispatch");
                    }
                }
                Err(DispatcherError::Aborted(reason))
            }
        };

        match result {
            Ok(outcome) => update_stats(&stats, |s| {
                match outcome {
                    DispatchOutcome::Triggered { .. } => {
                        s.jobs_dispatched += 1;
                        s.jobs_triggered += 1;
                    }
                    DispatchOutcome::Failed { .. } => {
                        s.jobs_dispatched += 1;
                        s.jobs_failed += 1;
                    }
                    DispatchOutcome::Discarded { .. } => s.jobs_discarded += 1,
                }
            }),
            Err(e) => {
                error!(dispatcher = %config.name, error = %e, "dispatch aborted; pausing");
                update_stats(&stats, |s| s.loop_errors += 1);
                sleep_or_cancel(&cancel, config.error_backoff).await;
            }
        }
    }

    info!(dispatcher = %config.name, "dispatcher stopped");
}

async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

fn update_stats(stats: &Mutex<DispatcherStats>, f: impl FnOnce(&mut DispatcherStats)) {
    match stats.lock() {
        Ok(mut s) => f(&mut s),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

fn read_stats(stats: &Mutex<DispatcherStats>) -> DispatcherStats {
    match stats.lock() {
        Ok(s) => s.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
