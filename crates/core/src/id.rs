//! Job identifiers.
//!
//! Ids look like `dr-1717000000000-k3j9x0a1b`: a fixed prefix, the creation
//! time in epoch milliseconds, and nine random lowercase alphanumerics.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

const PREFIX: &str = "dr-";
const SUFFIX_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random part of a job id.
pub const SUFFIX_LEN: usize = 9;

/// Identifier of a DR trigger job.
///
/// Assigned once by the job factory and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id stamped with the current time.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate a fresh id stamped with `now`.
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        Self(format!("{PREFIX}{}-{}", now.timestamp_millis(), random_suffix()))
    }

    /// Wrap an id received from outside (path parameter, stored record)
    /// without validating its shape. Lookups of unknown ids are a "not found",
    /// not a malformed request.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in the id, if the id is well formed.
    pub fn created_millis(&self) -> Option<i64> {
        split_id(&self.0).map(|(millis, _)| millis)
    }

    /// Whether the id follows the `dr-<digits>-<9 alphanumerics>` shape.
    pub fn is_well_formed(&self) -> bool {
        split_id(&self.0).is_some()
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if split_id(s).is_none() {
            return Err(DomainError::invalid_id(format!("JobId: {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

fn split_id(raw: &str) -> Option<(i64, &str)> {
    let rest = raw.strip_prefix(PREFIX)?;
    let (millis, suffix) = rest.split_once('-')?;

    if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if suffix.len() != SUFFIX_LEN || !suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    millis.parse().ok().map(|m| (m, suffix))
}

// Drawn from the low bits of a v4 UUID; the fixed version/variant bits sit
// far above the ~47 bits consumed here.
fn random_suffix() -> String {
    let mut n = Uuid::new_v4().as_u128();
    let base = SUFFIX_ALPHABET.len() as u128;
    let mut out = String::with_capacity(SUFFIX_LEN);
    for _ in 0..SUFFIX_LEN {
        out.push(SUFFIX_ALPHABET[(n % base) as usize] as char);
        n /= base;
    }
    out
}
