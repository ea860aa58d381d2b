//! Job storage implementations.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use drtrigger_core::{JobId, JobRecord};

/// Job store abstraction.
///
/// Every method maps to one atomic operation on the backing store; callers
/// never hold a lock across calls. Queue entries are the serialized job
/// exactly as enqueued, so the processing marker can be removed by value.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append a job to the queue. Returns the queue length after the append.
    async fn enqueue(&self, job: &JobRecord) -> Result<u64, JobStoreError>;

    /// Pop the oldest queued entry, waiting up to `timeout`.
    /// Returns `None` when nothing arrived in time.
    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<String>, JobStoreError>;

    /// Record that a dequeued entry is being dispatched.
    async fn mark_processing(&self, raw: &str) -> Result<(), JobStoreError>;

    /// Remove one processing marker equal to `raw`.
    async fn unmark_processing(&self, raw: &str) -> Result<(), JobStoreError>;

    /// Upsert the status record for `job.id`.
    async fn set_status(&self, job: &JobRecord) -> Result<(), JobStoreError>;

    /// Fetch the status record for a job, if one was written.
    async fn get_status(&self, id: &JobId) -> Result<Option<JobRecord>, JobStoreError>;

    async fn queue_depth(&self) -> Result<u64, JobStoreError>;

    async fn processing_depth(&self) -> Result<u64, JobStoreError>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), JobStoreError>;

    /// Snapshot of the processing marker, newest first.
    async fn processing_entries(&self) -> Result<Vec<String>, JobStoreError>;

    /// Atomically move one processing entry back to the dispatch end of the
    /// queue. Returns `false` if no such entry was present.
    async fn requeue_processing(&self, raw: &str) -> Result<bool, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store command failed: {0}")]
    Command(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Names of the three structures backing the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    pub queue: String,
    pub processing: String,
    pub statuses: String,
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            queue: "dr-queue".to_string(),
            processing: "dr-processing".to_string(),
            statuses: "jenkins_jobs".to_string(),
        }
    }
}

pub fn encode_job(job: &JobRecord) -> Result<String, JobStoreError> {
    serde_json::to_string(job).map_err(|e| JobStoreError::Serialization(e.to_string()))
}

pub fn decode_job(raw: &str) -> Result<JobRecord, JobStoreError> {
    serde_json::from_str(raw).map_err(|e| JobStoreError::Serialization(e.to_string()))
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<String>,
    processing: VecDeque<String>,
    statuses: HashMap<String, String>,
}

/// In-memory job store for tests/dev. Same semantics as the Redis store,
/// including serialized entries.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: Mutex<State>,
    available: Notify,
    offline: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Simulate losing the connection: every call fails with `Unavailable`
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        if !offline {
            self.available.notify_waiters();
        }
    }

    /// Push a raw entry, bypassing serialization (malformed-entry tests).
    pub fn push_raw(&self, raw: impl Into<String>) -> Result<(), JobStoreError> {
        self.lock()?.queue.push_back(raw.into());
        self.available.notify_one();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, JobStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(JobStoreError::Unavailable("in-memory store offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| JobStoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: &JobRecord) -> Result<u64, JobStoreError> {
        let raw = encode_job(job)?;
        let len = {
            let mut state = self.lock()?;
            state.queue.push_back(raw);
            state.queue.len() as u64
        };
        self.available.notify_one();
        Ok(len)
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<String>, JobStoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            let next = self.lock()?.queue.pop_front();
            if next.is_some() {
                return Ok(next);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn mark_processing(&self, raw: &str) -> Result<(), JobStoreError> {
        self.lock()?.processing.push_front(raw.to_string());
        Ok(())
    }

    async fn unmark_processing(&self, raw: &str) -> Result<(), JobStoreError> {
        let mut state = self.lock()?;
        if let Some(pos) = state.processing.iter().position(|p| p == raw) {
            state.processing.remove(pos);
        }
        Ok(())
    }

    async fn set_status(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        let raw = encode_job(job)?;
        self.lock()?.statuses.insert(job.id.to_string(), raw);
        Ok(())
    }

    async fn get_status(&self, id: &JobId) -> Result<Option<JobRecord>, JobStoreError> {
        let raw = self.lock()?.statuses.get(id.as_str()).cloned();
        raw.as_deref().map(decode_job).transpose()
    }

    async fn queue_depth(&self) -> Result<u64, JobStoreError> {
        Ok(self.lock()?.queue.len() as u64)
    }

    async fn processing_depth(&self) -> Result<u64, JobStoreError> {
        Ok(self.lock()?.processing.len() as u64)
    }

    async fn ping(&self) -> Result<(), JobStoreError> {
        self.lock().map(|_| ())
    }

    async fn processing_entries(&self) -> Result<Vec<String>, JobStoreError> {
        Ok(self.lock()?.processing.iter().cloned().collect())
    }

    async fn requeue_processing(&self, raw: &str) -> Result<bool, JobStoreError> {
        let moved = {
            let mut state = self.lock()?;
            match state.processing.iter().position(|p| p == raw) {
                Some(pos) => {
                    state.processing.remove(pos);
                    state.queue.push_front(raw.to_string());
                    true
                }
                None => false,
            }
        };
        if moved {
            self.available.notify_one();
        }
        Ok(moved)
    }
}

#[async_trait]
impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    async fn enqueue(&self, job: &JobRecord) -> Result<u64, JobStoreError> {
        (**self).enqueue(job).await
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<String>, JobStoreError> {
        (**self).dequeue_blocking(timeout).await
    }

    async fn mark_processing(&self, raw: &str) -> Result<(), JobStoreError> {
        (**self).mark_processing(raw).await
    }

    async fn unmark_processing(&self, raw: &str) -> Result<(), JobStoreError> {
        (**self).unmark_processing(raw).await
    }

    async fn set_status(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        (**self).set_status(job).await
    }

    async fn get_status(&self, id: &JobId) -> Result<Option<JobRecord>, JobStoreError> {
        (**self).get_status(id).await
    }

    async fn queue_depth(&self) -> Result<u64, JobStoreError> {
        (**self).queue_depth().await
    }

    async fn processing_depth(&self) -> Result<u64, JobStoreError> {
        (**self).processing_depth().await
    }

    async fn ping(&self) -> Result<(), JobStoreError> {
        (**self).ping().await
    }

    async fn processing_entries(&self) -> Result<Vec<String>, JobStoreError> {
        (**self).processing_entries().await
    }

    async fn requeue_processing(&self, raw: &str) -> Result<bool, JobStoreError> {
        (**self).requeue_processing(raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drtrigger_core::{JobFactory, TriggerRequest};

    fn new_job() -> JobRecord {
        JobFactory::new().create_job(&TriggerRequest::default(), "test")
    }

    #[tokio::test]
    async fn enqueue_reports_growing_depth() {
        let store = InMemoryJobStore::new();

        let mut last = 0;
        for _ in 0..5 {
            let len = store.enqueue(&new_job()).await.unwrap();
            assert!(len > last);
            assert_eq!(store.queue_depth().await.unwrap(), len);
            last = len;
        }
    }

    #[tokio::test]
    async fn dequeue_is_fifo() {
        let store = InMemoryJobStore::new();
        let a = new_job();
        let b = new_job();
        store.enqueue(&a).await.unwrap();
        store.enqueue(&b).await.unwrap();

        let first = store.dequeue_blocking(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = store.dequeue_blocking(Duration::from_millis(10)).await.unwrap().unwrap();

        assert_eq!(decode_job(&first).unwrap().id, a.id);
        assert_eq!(decode_job(&second).unwrap().id, b.id);
        assert_eq!(store.queue_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dequeue_times_out_with_none() {
        let store = InMemoryJobStore::new();
        let started = tokio::time::Instant::now();
        let popped = store.dequeue_blocking(Duration::from_millis(50)).await.unwrap();

        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn blocked_dequeue_wakes_on_enqueue() {
        let store = InMemoryJobStore::arc();
        let job = new_job();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.dequeue_blocking(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.enqueue(&job).await.unwrap();

        let raw = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(decode_job(&raw).unwrap().id, job.id);
    }

    #[tokio::test]
    async fn processing_marker_is_removed_by_value() {
        let store = InMemoryJobStore::new();
        store.mark_processing("a").await.unwrap();
        store.mark_processing("b").await.unwrap();
        assert_eq!(store.processing_depth().await.unwrap(), 2);
        assert_eq!(store.processing_entries().await.unwrap(), vec!["b", "a"]);

        store.unmark_processing("a").await.unwrap();
        assert_eq!(store.processing_entries().await.unwrap(), vec!["b"]);

        // Removing something absent is a no-op.
        store.unmark_processing("zzz").await.unwrap();
        assert_eq!(store.processing_depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn status_upsert_and_lookup() {
        let store = InMemoryJobStore::new();
        let mut job = new_job();

        assert!(store.get_status(&job.id).await.unwrap().is_none());

        store.set_status(&job).await.unwrap();
        job.mark_failed("boom", chrono::Utc::now()).unwrap();
        store.set_status(&job).await.unwrap();

        let stored = store.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(stored, job);
        assert!(store.get_status(&JobId::from_raw("unknown-id")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn requeue_moves_entry_to_dispatch_end() {
        let store = InMemoryJobStore::new();
        let queued = new_job();
        let orphan = new_job();
        store.enqueue(&queued).await.unwrap();
        let orphan_raw = encode_job(&orphan).unwrap();
        store.mark_processing(&orphan_raw).await.unwrap();

        assert!(store.requeue_processing(&orphan_raw).await.unwrap());
        assert!(!store.requeue_processing(&orphan_raw).await.unwrap());
        assert_eq!(store.processing_depth().await.unwrap(), 0);

        let next = store.dequeue_blocking(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(next, orphan_raw);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = InMemoryJobStore::new();
        store.set_offline(true);

        assert!(matches!(store.enqueue(&new_job()).await, Err(JobStoreError::Unavailable(_))));
        assert!(store.ping().await.is_err());

        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }
}
