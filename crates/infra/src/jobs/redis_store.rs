//! Redis-backed job store.
//!
//! ## Layout
//!
//! - **Queue** (`dr-queue`): list, LPUSH on enqueue, BRPOP on dequeue (FIFO)
//! - **Processing** (`dr-processing`): list of in-flight entries, removed by value with LREM
//! - **Statuses** (`jenkins_jobs`): hash `job id -> job JSON`
//!
//! The blocking pop runs on its own connection so request-path commands are
//! never queued behind a parked BRPOP.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument};

use drtrigger_core::{JobId, JobRecord};

use super::store::{decode_job, encode_job, JobStore, JobStoreError, StoreKeys};

/// Move one entry from the processing list back to the dispatch end of the
/// queue, atomically. KEYS[1] = processing, KEYS[2] = queue, ARGV[1] = entry.
const REQUEUE_SCRIPT: &str = r#"
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
if removed > 0 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
end
return removed
"#;

#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    blocking: ConnectionManager,
    keys: StoreKeys,
    requeue: redis::Script,
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore").field("keys", &self.keys).finish_non_exhaustive()
    }
}

impl RedisJobStore {
    /// Connect to Redis and verify the connection with a PING.
    ///
    /// * `redis_url` - e.g. `redis://localhost:6379/`
    pub async fn connect(redis_url: &str, keys: StoreKeys) -> Result<Self, JobStoreError> {
        let client = redis::Client::open(redis_url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client.clone()).await.map_err(map_redis_error)?;
        let blocking = ConnectionManager::new(client).await.map_err(map_redis_error)?;

        let store = Self {
            conn,
            blocking,
            keys,
            requeue: redis::Script::new(REQUEUE_SCRIPT),
        };
        store.ping().await?;
        Ok(store)
    }

    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, queue = %self.keys.queue))]
    async fn enqueue(&self, job: &JobRecord) -> Result<u64, JobStoreError> {
        let raw = encode_job(job)?;
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("LPUSH")
            .arg(&self.keys.queue)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(len)
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<String>, JobStoreError> {
        // BRPOP treats 0 as "wait forever"; integer seconds keep older servers happy.
        let secs = timeout.as_secs().max(1);
        let mut conn = self.blocking.clone();
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.keys.queue)
            .arg(secs)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        if popped.is_some() {
            debug!(queue = %self.keys.queue, "dequeued entry");
        }
        Ok(popped.map(|(_, raw)| raw))
    }

    async fn mark_processing(&self, raw: &str) -> Result<(), JobStoreError> {
        let mut conn = self.conn.clone();
        let _: u64 = redis::cmd("LPUSH")
            .arg(&self.keys.processing)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn unmark_processing(&self, raw: &str) -> Result<(), JobStoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(&self.keys.processing)
            .arg(1)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status()))]
    async fn set_status(&self, job: &JobRecord) -> Result<(), JobStoreError> {
        let raw = encode_job(job)?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HSET")
            .arg(&self.keys.statuses)
            .arg(job.id.as_str())
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn get_status(&self, id: &JobId) -> Result<Option<JobRecord>, JobStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(&self.keys.statuses)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        raw.as_deref().map(decode_job).transpose()
    }

    async fn queue_depth(&self) -> Result<u64, JobStoreError> {
        self.llen(&self.keys.queue).await
    }

    async fn processing_depth(&self) -> Result<u64, JobStoreError> {
        self.llen(&self.keys.processing).await
    }

    async fn ping(&self) -> Result<(), JobStoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn processing_entries(&self) -> Result<Vec<String>, JobStoreError> {
        let mut conn = self.conn.clone();
        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.keys.processing)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(entries)
    }

    async fn requeue_processing(&self, raw: &str) -> Result<bool, JobStoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .requeue
            .key(&self.keys.processing)
            .key(&self.keys.queue)
            .arg(raw)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }
}

impl RedisJobStore {
    async fn llen(&self, key: &str) -> Result<u64, JobStoreError> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(len)
    }
}

fn map_redis_error(e: redis::RedisError) -> JobStoreError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() || e.is_timeout() {
        JobStoreError::Unavailable(e.to_string())
    } else {
        JobStoreError::Command(e.to_string())
    }
}
