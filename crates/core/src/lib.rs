//! `drtrigger-core`: domain building blocks for DR pipeline trigger jobs.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! job identifiers, the typed parameter set, the job record state machine and
//! the factory that turns an inbound trigger request into a queued job.

pub mod error;
pub mod factory;
pub mod id;
pub mod job;
pub mod parameters;

pub use error::{DomainError, DomainResult};
pub use factory::{JobFactory, TriggerRequest, DEFAULT_SOURCE};
pub use id::JobId;
pub use job::{JobRecord, JobState, JobStatus};
pub use parameters::{JobParameters, ParameterValue, RequestParameters};
