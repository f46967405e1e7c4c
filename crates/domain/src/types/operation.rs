//! Queued operation records
//!
//! A [`QueuedOperation`] is the durable form of a caller's request that could
//! not run immediately. The queue never interprets `payload`; it only routes
//! it to whatever executor is registered for `kind`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DEFAULT_MAX_RETRIES;
use crate::impl_domain_enum_conversions;

/// Drain priority. Lower ordinal drains first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High = 0,
    #[default]
    Medium = 1,
    Low = 2,
}

impl_domain_enum_conversions!(Priority {
    High => "high",
    Medium => "medium",
    Low => "low",
});

/// Opaque operation identifier, unique for the lifetime of a store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OperationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What a caller submits. The store fills in identity, timestamps and retry
/// bookkeeping when the operation is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOperation {
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub max_retries: u32,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Failure that caused the operation to be queued, if any.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl NewOperation {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            priority: Priority::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            meta: BTreeMap::new(),
            last_error: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

/// Durable queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: OperationId,
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Once false the operation is permanently failed and never drained again.
    pub retry_allowed: bool,
    pub last_error: Option<String>,
    /// Earliest instant the operation may be attempted again.
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Insertion order; ties within a priority tier drain in this order.
    pub sequence: u64,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl QueuedOperation {
    /// Materialize an accepted request.
    pub fn from_new(
        spec: NewOperation,
        id: OperationId,
        sequence: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: spec.kind,
            payload: spec.payload,
            priority: spec.priority,
            created_at,
            retry_count: 0,
            max_retries: spec.max_retries,
            retry_allowed: true,
            last_error: spec.last_error,
            next_attempt_at: None,
            last_attempt_at: None,
            sequence,
            meta: spec.meta,
        }
    }

    /// Drain order key: priority first, then insertion order.
    pub fn ordering_key(&self) -> (Priority, u64) {
        (self.priority, self.sequence)
    }

    /// True when the operation may be attempted at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.retry_allowed && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    pub fn is_permanently_failed(&self) -> bool {
        !self.retry_allowed
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    /// Re-establish `retry_count <= max_retries`, flipping `retry_allowed`
    /// off once the bound is reached.
    fn enforce_retry_bound(&mut self) {
        if self.retry_count >= self.max_retries {
            self.retry_count = self.max_retries;
            self.retry_allowed = false;
        }
    }
}

/// Partial update applied by the queue processor's retry bookkeeping.
///
/// `None` leaves a field untouched. Nullable fields use a nested `Option` so
/// that a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationPatch {
    pub retry_count: Option<u32>,
    pub retry_allowed: Option<bool>,
    pub last_error: Option<Option<String>>,
    pub next_attempt_at: Option<Option<DateTime<Utc>>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OperationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    #[must_use]
    pub fn retry_allowed(mut self, allowed: bool) -> Self {
        self.retry_allowed = Some(allowed);
        self
    }

    #[must_use]
    pub fn last_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    #[must_use]
    pub fn next_attempt_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.next_attempt_at = Some(at);
        self
    }

    #[must_use]
    pub fn last_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempt_at = Some(at);
        self
    }

    /// Merge into `operation`. The retry bound is re-checked afterwards, so a
    /// patch can never leave `retry_count` above `max_retries`.
    pub fn apply(self, operation: &mut QueuedOperation) {
        if let Some(count) = self.retry_count {
            operation.retry_count = count;
        }
        if let Some(allowed) = self.retry_allowed {
            operation.retry_allowed = allowed;
        }
        if let Some(error) = self.last_error {
            operation.last_error = error;
        }
        if let Some(at) = self.next_attempt_at {
            operation.next_attempt_at = at;
        }
        if let Some(at) = self.last_attempt_at {
            operation.last_attempt_at = Some(at);
        }
        operation.enforce_retry_bound();
    }
}

/// Selection criteria for listing queue entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationFilter {
    pub retry_allowed: Option<bool>,
    pub kind: Option<String>,
    pub priority: Option<Priority>,
}

impl OperationFilter {
    /// Entries a drain pass may attempt.
    pub fn drain_candidates() -> Self {
        Self { retry_allowed: Some(true), ..Self::default() }
    }

    /// Entries waiting for the caller to acknowledge a permanent failure.
    pub fn permanently_failed() -> Self {
        Self { retry_allowed: Some(false), ..Self::default() }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn matches(&self, operation: &QueuedOperation) -> bool {
        self.retry_allowed.map_or(true, |allowed| operation.retry_allowed == allowed)
            && self.kind.as_deref().map_or(true, |kind| operation.kind == kind)
            && self.priority.map_or(true, |priority| operation.priority == priority)
    }
}

/// Coarse view of the queue for status indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Entries still eligible for automatic retry.
    pub pending: usize,
    /// Permanently failed entries awaiting acknowledgement.
    pub failed: usize,
    /// Whether a drain pass is running.
    pub processing: bool,
}
