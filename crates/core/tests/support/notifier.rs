use fieldsync_common::error::CommonError;
use fieldsync_core::Notifier;
use fieldsync_domain::{OperationId, QueuedOperation};
use parking_lot::Mutex;

/// Notifier that records every notice it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    queued: Mutex<Vec<OperationId>>,
    failed: Mutex<Vec<OperationId>>,
    persistence: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> Vec<OperationId> {
        self.queued.lock().clone()
    }

    pub fn failed(&self) -> Vec<OperationId> {
        self.failed.lock().clone()
    }

    pub fn persistence_failures(&self) -> usize {
        self.persistence.lock().len()
    }
}

impl Notifier for RecordingNotifier {
    fn operation_queued(&self, operation: &QueuedOperation) {
        self.queued.lock().push(operation.id.clone());
    }

    fn operation_failed(&self, operation: &QueuedOperation) {
        self.failed.lock().push(operation.id.clone());
    }

    fn persistence_failed(&self, error: &CommonError) {
        self.persistence.lock().push(error.to_string());
    }
}
