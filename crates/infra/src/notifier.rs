//! `Notifier` that reports queue notices through `tracing`

use fieldsync_common::error::CommonError;
use fieldsync_core::Notifier;
use fieldsync_domain::QueuedOperation;
use tracing::{error, info, warn};

/// Logs every user-facing notice. Useful headless, or as a fallback when the
/// embedding application has no notification surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn operation_queued(&self, operation: &QueuedOperation) {
        info!(
            operation_id = %operation.id,
            kind = %operation.kind,
            priority = %operation.priority,
            "Saved offline, will sync when connected"
        );
    }

    fn operation_failed(&self, operation: &QueuedOperation) {
        warn!(
            operation_id = %operation.id,
            kind = %operation.kind,
            retry_count = operation.retry_count,
            error = operation.last_error.as_deref().unwrap_or("unknown"),
            "Operation failed after retries"
        );
    }

    fn persistence_failed(&self, err: &CommonError) {
        error!(error = %err, "Could not save offline changes");
    }
}
