//! Integration tests for the error module
//!
//! Checks that a module error built with the exported macros composes with
//! `CommonError` the way the queue and gateway errors do.

#![cfg(feature = "foundation")]

use std::time::Duration;

use fieldsync_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use fieldsync_common::{impl_error_classification, impl_error_conversion};
use thiserror::Error;

#[derive(Debug, Error)]
enum StoreError {
    #[error("Store is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_conversion!(StoreError, Common);

impl_error_classification!(StoreError, Common,
    Self::Full { .. } => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    }
);

fn read_snapshot(raw: &str) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

#[test]
fn test_question_mark_converts_serde_errors() {
    let err = read_snapshot("[1, 2").unwrap_err();

    assert!(matches!(err, StoreError::Common(CommonError::Serialization { .. })));
    assert_eq!(err.severity(), ErrorSeverity::Error);
    assert!(!err.is_retryable());
}

#[test]
fn test_module_variant_classification() {
    let err = StoreError::Full { capacity: 10 };

    assert_eq!(err.to_string(), "Store is full (capacity 10)");
    assert_eq!(err.severity(), ErrorSeverity::Warning);
    assert!(err.retry_after().is_none());
}

#[test]
fn test_transparent_display_and_delegation() {
    let err: StoreError = CommonError::timeout("save", Duration::from_secs(2)).into();

    assert_eq!(err.to_string(), "Operation 'save' timed out after 2s");
    assert!(err.is_retryable());
}
