use fieldsync_common::error::{CommonError, ErrorSeverity};
use fieldsync_common::{impl_error_classification, impl_error_conversion};
use thiserror::Error;

use crate::queue::QueueError;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Offline and the caller did not allow queueing
    #[error("Network unavailable and queueing is disabled for '{kind}'")]
    NetworkUnavailable { kind: String },

    #[error("No executor registered for kind '{0}'")]
    UnknownKind(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl GatewayError {
    /// The operation could not be made durable; it was not queued
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Queue(err) if err.is_persistence_failure())
    }
}

impl_error_conversion!(GatewayError, Common);

impl_error_classification!(GatewayError, Common,
    Self::NetworkUnavailable { .. } => {
        retryable: true,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::UnknownKind(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Queue(err) => {
        retryable: fieldsync_common::error::ErrorClassification::is_retryable(err),
        severity: fieldsync_common::error::ErrorClassification::severity(err),
        critical: fieldsync_common::error::ErrorClassification::is_critical(err),
    }
);
