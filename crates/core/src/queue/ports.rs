//! Port interfaces for queue persistence and user-facing notices

use async_trait::async_trait;
use fieldsync_common::error::{CommonError, CommonResult};
use fieldsync_domain::QueuedOperation;
use serde_json::Value;

/// Key/value persistence used by the queue store
///
/// `save` must not return until the entries are durable; the store
/// acknowledges a mutation only after `save` succeeds.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Entries saved under `key`, empty when nothing was saved yet
    async fn load(&self, key: &str) -> CommonResult<Vec<Value>>;

    /// Replace the entries saved under `key`
    async fn save(&self, key: &str, entries: &[Value]) -> CommonResult<()>;
}

/// User-facing notice mechanism
///
/// Each hook fires exactly once per transition of a given operation.
pub trait Notifier: Send + Sync {
    /// The operation was accepted into the queue instead of running now
    fn operation_queued(&self, operation: &QueuedOperation);

    /// The operation exhausted its retries and needs attention
    fn operation_failed(&self, operation: &QueuedOperation);

    /// A durable write failed
    fn persistence_failed(&self, error: &CommonError) {
        let _ = error;
    }
}

/// Notifier that ignores every notice
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn operation_queued(&self, _operation: &QueuedOperation) {}

    fn operation_failed(&self, _operation: &QueuedOperation) {}
}
