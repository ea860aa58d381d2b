//! Startup recovery of jobs left in the processing list by a crashed process.
//!
//! Must run before the dispatcher starts; with a dispatcher running, its own
//! in-flight entry would look orphaned.

use tracing::{info, warn};

use super::store::{decode_job, JobStore, JobStoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries moved back to the dispatch end of the queue.
    pub requeued: usize,
    /// Entries whose job already had a terminal status; marker cleared only.
    pub cleared: usize,
    /// Unreadable entries dropped from the processing list.
    pub discarded: usize,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.requeued == 0 && self.cleared == 0 && self.discarded == 0
    }
}

/// Reconcile every processing entry against the status table.
///
/// A job with a terminal status was dispatched before the crash and only its
/// marker survived; anything else never reached the pipeline and is queued
/// again, ahead of newer work.
pub async fn recover_orphaned_jobs<S: JobStore + ?Sized>(store: &S) -> Result<RecoveryReport, JobStoreError> {
    let mut report = RecoveryReport::default();

    // Newest first: each requeue lands at the dispatch end, so the oldest
    // orphan ends up dispatched first.
    let entries = store.processing_entries().await?;

    for raw in entries {
        let job = match decode_job(&raw) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "dropping unreadable processing entry");
                store.unmark_processing(&raw).await?;
                report.discarded += 1;
                continue;
            }
        };

        let finished = store
            .get_status(&job.id)
            .await?
            .is_some_and(|stored| stored.is_terminal());

        if finished {
            store.unmark_processing(&raw).await?;
            report.cleared += 1;
        } else if store.requeue_processing(&raw).await? {
            info!(job_id = %job.id, "requeued orphaned job");
            report.requeued += 1;
        }
    }

    if !report.is_empty() {
        info!(
            requeued = report.requeued,
            cleared = report.cleared,
            discarded = report.discarded,
            "processing list recovered"
        );
    }
    Ok(report)
}
