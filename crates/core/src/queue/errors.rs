use fieldsync_common::error::{CommonError, ErrorSeverity};
use fieldsync_common::{impl_error_classification, impl_error_conversion};
use fieldsync_domain::OperationId;
use thiserror::Error;

/// Result alias for queue store and processor calls
pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Queue is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("Operation already queued: {0}")]
    DuplicateId(OperationId),

    #[error("Queued operation not found: {0}")]
    NotFound(OperationId),

    #[error("Operation {0} has not permanently failed")]
    NotPermanentlyFailed(OperationId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Stored queue contents could not be decoded on open
    #[error("Stored queue '{key}' is corrupt: {message}")]
    Corrupted { key: String, message: String },

    /// The durable write failed; the in-memory queue was left unchanged
    #[error("Durable write failed: {0}")]
    Persistence(CommonError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl QueueError {
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl_error_conversion!(QueueError, Common);

impl_error_classification!(QueueError, Common,
    Self::CapacityExceeded { .. } => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::DuplicateId(_) | Self::InvalidOperation(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::NotFound(_) | Self::NotPermanentlyFailed(_) => {
        retryable: false,
        severity: ErrorSeverity::Info,
        critical: false,
    },
    Self::Corrupted { .. } => {
        retryable: false,
        severity: ErrorSeverity::Critical,
        critical: true,
    },
    Self::Persistence(_) => {
        retryable: true,
        severity: ErrorSeverity::Error,
        critical: false,
    }
);

#[cfg(test)]
mod tests {
    use fieldsync_common::error::ErrorClassification;

    use super::*;

    #[test]
    fn test_classification() {
        let err = QueueError::Persistence(CommonError::persistence("disk full"));
        assert!(err.is_persistence_failure());
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Durable write failed: Persistence error: disk full");

        let err = QueueError::Corrupted { key: "offline_queue".into(), message: "eof".into() };
        assert!(err.is_critical());

        let err = QueueError::NotFound(OperationId::from("abc"));
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert!(!err.is_persistence_failure());
    }
}
