//! Durable job queue and the single-consumer dispatch loop.
//!
//! ## Design
//!
//! - Jobs are appended to a FIFO queue list and popped with a blocking pop
//! - A popped job is pushed onto a processing list while it is in flight,
//!   so a crash leaves a visible breadcrumb
//! - The final record (triggered or failed) is written to a status hash
//!   keyed by job id and kept indefinitely
//! - Dispatch failures are terminal: no retries, no re-queue
//!
//! ## Components
//!
//! - `JobStore`: queue, processing marker and status table (in-memory or Redis)
//! - `Dispatcher`: dequeues, triggers the pipeline, reconciles status
//! - `recover_orphaned_jobs`: startup pass over entries left in the processing list

pub mod dispatcher;
pub mod recovery;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use dispatcher::{
    DispatchOutcome, Dispatcher, DispatcherConfig, DispatcherError, DispatcherHandle, DispatcherStats,
};
pub use recovery::{recover_orphaned_jobs, RecoveryReport};
pub use store::{decode_job, encode_job, InMemoryJobStore, JobStore, JobStoreError, StoreKeys};

#[cfg(feature = "redis")]
pub use redis_store::RedisJobStore;
