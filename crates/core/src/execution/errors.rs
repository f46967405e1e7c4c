use std::time::Duration;

use fieldsync_common::error::{ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by an executor
///
/// Transient failures are retried by the queue processor up to the
/// operation's `max_retries`; permanent ones end the operation on the spot.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ExecutionError {
    message: String,
    retryable: bool,
}

impl ExecutionError {
    /// A failure worth retrying (network drop, 5xx, timeout)
    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }

    /// A failure that will not go away by retrying (validation, 4xx)
    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn unknown_kind(kind: &str) -> Self {
        Self::permanent(format!("no executor registered for kind '{kind}'"))
    }
}

impl ErrorClassification for ExecutionError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn severity(&self) -> ErrorSeverity {
        if self.retryable {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
