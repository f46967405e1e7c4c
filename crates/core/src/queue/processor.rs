//! Queue drain loop
//!
//! One drain pass walks the retry-allowed entries in priority-major,
//! insertion-minor order and runs each eligible one through its executor,
//! sequentially. A boolean processing flag makes overlapping passes
//! impossible: a second `drain()` while one is running returns immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fieldsync_common::error::ErrorClassification;
use fieldsync_common::sync::{BackoffPolicy, QueueMetrics};
use fieldsync_common::testing::{Clock, SystemClock};
use fieldsync_domain::{OperationFilter, OperationPatch, QueueStatus, QueuedOperation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::errors::{QueueError, QueueResult};
use super::events::{OperationEvent, OperationEvents};
use super::ports::Notifier;
use super::store::OperationQueueStore;
use crate::execution::{ExecutionError, ExecutorRegistry};
use crate::network::NetworkStateMonitor;

/// Why a drain pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainSkipReason {
    AlreadyProcessing,
    Offline,
}

/// What one drain pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub skipped: Option<DrainSkipReason>,
    pub attempted: usize,
    pub completed: usize,
    pub retry_scheduled: usize,
    pub permanently_failed: usize,
    /// Entries still inside their backoff window
    pub deferred: usize,
    /// The pass stopped early because connectivity dropped
    pub interrupted: bool,
}

impl DrainReport {
    fn skipped(reason: DrainSkipReason) -> Self {
        Self { skipped: Some(reason), ..Self::default() }
    }

    pub fn ran(&self) -> bool {
        self.skipped.is_none()
    }
}

/// Clears the processing flag when the pass ends, including on early return
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum AttemptOutcome {
    Completed,
    RetryScheduled,
    PermanentlyFailed,
    /// Gone or no longer retryable before the executor ran
    NotRun,
    /// Removed while the executor was running
    Vanished,
}

/// Drives queued operations to completion when connectivity allows
pub struct QueueProcessor {
    store: Arc<OperationQueueStore>,
    monitor: NetworkStateMonitor,
    registry: Arc<ExecutorRegistry>,
    notifier: Arc<dyn Notifier>,
    events: OperationEvents,
    backoff: BackoffPolicy,
    clock: Arc<dyn Clock>,
    processing: AtomicBool,
}

impl std::fmt::Debug for QueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcessor")
            .field("backoff", &self.backoff)
            .field("processing", &self.is_processing())
            .finish_non_exhaustive()
    }
}

impl QueueProcessor {
    pub fn new(
        store: Arc<OperationQueueStore>,
        monitor: NetworkStateMonitor,
        registry: Arc<ExecutorRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            monitor,
            registry,
            notifier,
            events: OperationEvents::default(),
            backoff: BackoffPolicy::default(),
            clock: Arc::new(SystemClock),
            processing: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Share an event channel, normally the gateway's
    #[must_use]
    pub fn with_events(mut self, events: OperationEvents) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(&self) -> &OperationEvents {
        &self.events
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Pending and failed counts plus the processing flag
    pub async fn status(&self) -> QueueStatus {
        let (pending, failed) = self.store.counts().await;
        QueueStatus { pending, failed, processing: self.is_processing() }
    }

    /// Re-entry point for reconnect events and the periodic timer
    pub async fn retry_queue(&self) -> QueueResult<DrainReport> {
        self.drain().await
    }

    /// Run one drain pass
    ///
    /// Returns a skipped report when offline or when another pass holds the
    /// processing flag. A failed durable write aborts the pass and is
    /// returned after the notifier has been told.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> QueueResult<DrainReport> {
        let metrics = Arc::clone(self.store.metrics());

        if !self.monitor.is_online() {
            metrics.record_drain(false);
            debug!("Offline, skipping drain");
            return Ok(DrainReport::skipped(DrainSkipReason::Offline));
        }

        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            metrics.record_drain(false);
            debug!("Drain already in progress");
            return Ok(DrainReport::skipped(DrainSkipReason::AlreadyProcessing));
        }
        let _guard = ProcessingGuard(&self.processing);
        metrics.record_drain(true);

        let candidates = self.store.list(&OperationFilter::drain_candidates()).await;
        let mut report = DrainReport::default();

        for candidate in candidates {
            if !self.monitor.is_online() {
                info!(attempted = report.attempted, "Connectivity lost, stopping drain");
                report.interrupted = true;
                break;
            }
            if !candidate.is_eligible(self.clock.now()) {
                report.deferred += 1;
                continue;
            }

            report.attempted += 1;
            match self.attempt(candidate, &metrics).await {
                Ok(AttemptOutcome::Completed) => report.completed += 1,
                Ok(AttemptOutcome::RetryScheduled) => report.retry_scheduled += 1,
                Ok(AttemptOutcome::PermanentlyFailed) => report.permanently_failed += 1,
                Ok(AttemptOutcome::NotRun) => report.attempted -= 1,
                Ok(AttemptOutcome::Vanished) => {}
                Err(err) => {
                    if let QueueError::Persistence(cause) = &err {
                        self.notifier.persistence_failed(cause);
                    }
                    error!(error = %err, "Drain aborted");
                    return Err(err);
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                completed = report.completed,
                retry_scheduled = report.retry_scheduled,
                permanently_failed = report.permanently_failed,
                "Drain pass finished"
            );
        }
        Ok(report)
    }

    async fn attempt(
        &self,
        candidate: QueuedOperation,
        metrics: &QueueMetrics,
    ) -> QueueResult<AttemptOutcome> {
        // Cancelled or acknowledged since the candidate list was taken
        let Some(operation) = self.store.get(&candidate.id).await else {
            return Ok(AttemptOutcome::NotRun);
        };
        if !operation.retry_allowed {
            return Ok(AttemptOutcome::NotRun);
        }

        debug!(
            operation_id = %operation.id,
            kind = %operation.kind,
            retry_count = operation.retry_count,
            "Executing queued operation"
        );

        match self.registry.dispatch(&operation.kind, operation.payload.clone()).await {
            Ok(output) => {
                self.store.remove(&operation.id).await?;
                metrics.record_completion();
                self.events.emit(OperationEvent::Completed {
                    id: operation.id,
                    kind: operation.kind,
                    output,
                });
                Ok(AttemptOutcome::Completed)
            }
            Err(err) => self.record_failure(operation, err, metrics).await,
        }
    }

    async fn record_failure(
        &self,
        operation: QueuedOperation,
        err: ExecutionError,
        metrics: &QueueMetrics,
    ) -> QueueResult<AttemptOutcome> {
        let now = self.clock.now();
        let retry_count = (operation.retry_count + 1).min(operation.max_retries);
        let exhausted = !err.is_retryable() || retry_count >= operation.max_retries;

        let patch = OperationPatch::new()
            .retry_count(retry_count)
            .last_error(Some(err.message().to_string()))
            .last_attempt_at(now);

        if exhausted {
            let patch = patch.retry_allowed(false).next_attempt_at(None);
            let Some(failed) = self.update_if_present(&operation, patch).await? else {
                return Ok(AttemptOutcome::Vanished);
            };
            metrics.record_permanent_failure();
            warn!(
                operation_id = %failed.id,
                kind = %failed.kind,
                retry_count = failed.retry_count,
                error = %err,
                "Queued operation permanently failed"
            );
            self.notifier.operation_failed(&failed);
            self.events.emit(OperationEvent::PermanentlyFailed {
                id: failed.id,
                kind: failed.kind,
                error: err.message().to_string(),
            });
            return Ok(AttemptOutcome::PermanentlyFailed);
        }

        let delay = self.backoff.delay_for(retry_count);
        let next_attempt_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let patch = patch.next_attempt_at(Some(next_attempt_at));
        let Some(updated) = self.update_if_present(&operation, patch).await? else {
            return Ok(AttemptOutcome::Vanished);
        };
        metrics.record_transient_failure();
        debug!(
            operation_id = %updated.id,
            retry_count = updated.retry_count,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Retry scheduled"
        );
        self.events.emit(OperationEvent::RetryScheduled {
            id: updated.id,
            kind: updated.kind,
            retry_count: updated.retry_count,
            next_attempt_at,
            error: err.message().to_string(),
        });
        Ok(AttemptOutcome::RetryScheduled)
    }

    // The entry may have been cancelled while its executor was running
    async fn update_if_present(
        &self,
        operation: &QueuedOperation,
        patch: OperationPatch,
    ) -> QueueResult<Option<QueuedOperation>> {
        match self.store.update(&operation.id, patch).await {
            Ok(updated) => Ok(Some(updated)),
            Err(QueueError::NotFound(_)) => {
                debug!(operation_id = %operation.id, "Operation removed during execution");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
