//! Infrastructure layer: configuration, the Redis-backed job store, Vault,
//! outbound pipeline triggers and the dispatcher loop.

pub mod config;
pub mod jobs;
pub mod secrets;
pub mod trigger;
