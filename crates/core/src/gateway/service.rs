//! Mutation gateway
//!
//! The only entry point callers use for work that may have to wait for
//! connectivity. It decides between running the operation now and handing
//! it to the queue, and always gives the caller an immediate, typed answer.
//! It never retries on its own; that is the processor's job.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fieldsync_common::error::ErrorClassification;
use fieldsync_domain::constants::DEFAULT_MAX_RETRIES;
use fieldsync_domain::{NetworkState, NewOperation, OperationId, Priority, QueuedOperation};
use tracing::{debug, info, instrument, warn};

use super::errors::{GatewayError, GatewayResult};
use crate::execution::{ExecutionError, ExecutorRegistry, Operation};
use crate::network::NetworkStateMonitor;
use crate::queue::{
    Notifier, OperationEvent, OperationEvents, OperationQueueStore, QueueError,
};

/// Per-call execution policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub priority: Priority,
    /// Falls back to the gateway default when unset
    pub max_retries: Option<u32>,
    /// Queue instead of failing when offline
    pub queue_when_offline: bool,
    /// Queue a transient failure of an online attempt instead of returning it
    pub retry_on_failure: bool,
    pub meta: BTreeMap<String, String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            priority: Priority::default(),
            max_retries: None,
            queue_when_offline: true,
            retry_on_failure: false,
            meta: BTreeMap::new(),
        }
    }
}

impl ExecuteOptions {
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn queue_when_offline(mut self, enabled: bool) -> Self {
        self.queue_when_offline = enabled;
        self
    }

    #[must_use]
    pub fn retry_on_failure(mut self, enabled: bool) -> Self {
        self.retry_on_failure = enabled;
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Proof that an operation was durably queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedReceipt {
    pub id: OperationId,
    pub kind: String,
    pub priority: Priority,
    pub queued_at: DateTime<Utc>,
}

impl From<&QueuedOperation> for QueuedReceipt {
    fn from(operation: &QueuedOperation) -> Self {
        Self {
            id: operation.id.clone(),
            kind: operation.kind.clone(),
            priority: operation.priority,
            queued_at: operation.created_at,
        }
    }
}

/// Immediate answer to [`MutationGateway::execute`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Ran now and succeeded
    Completed(T),
    /// Deferred; watch the event channel for the final result
    Queued(QueuedReceipt),
    /// Ran now and failed without being queued
    Failed(ExecutionError),
}

impl<T> Outcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Queued(_) | Self::Failed(_) => None,
        }
    }
}

/// Execute-now-or-enqueue facade
pub struct MutationGateway {
    monitor: NetworkStateMonitor,
    store: Arc<OperationQueueStore>,
    registry: Arc<ExecutorRegistry>,
    notifier: Arc<dyn Notifier>,
    events: OperationEvents,
    default_max_retries: u32,
}

impl std::fmt::Debug for MutationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationGateway")
            .field("default_max_retries", &self.default_max_retries)
            .finish_non_exhaustive()
    }
}

impl MutationGateway {
    pub fn new(
        monitor: NetworkStateMonitor,
        store: Arc<OperationQueueStore>,
        registry: Arc<ExecutorRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            monitor,
            store,
            registry,
            notifier,
            events: OperationEvents::default(),
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: OperationEvents) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn events(&self) -> &OperationEvents {
        &self.events
    }

    pub fn network_state(&self) -> NetworkState {
        self.monitor.get_state()
    }

    /// Run `operation` now if online, otherwise queue it
    ///
    /// - online, success: `Completed(output)`; the queue is not touched
    /// - online, transient failure with `retry_on_failure`: queued
    /// - online, any other failure: `Failed(error)`
    /// - offline with `queue_when_offline`: `Queued(receipt)`
    /// - offline without it: `GatewayError::NetworkUnavailable`
    ///
    /// A queued outcome is only returned after the entry is durable.
    #[instrument(skip(self, operation, options), fields(kind = O::KIND))]
    pub async fn execute<O: Operation>(
        &self,
        operation: O,
        options: ExecuteOptions,
    ) -> GatewayResult<Outcome<O::Output>> {
        let handler = self
            .registry
            .handler::<O>()
            .ok_or_else(|| GatewayError::UnknownKind(O::KIND.to_string()))?;

        if !self.monitor.is_online() {
            if !options.queue_when_offline {
                debug!("Offline and queueing disabled");
                return Err(GatewayError::NetworkUnavailable { kind: O::KIND.to_string() });
            }
            let payload = serde_json::to_value(&operation)?;
            let receipt = self.enqueue(O::KIND, payload, options, None).await?;
            return Ok(Outcome::Queued(receipt));
        }

        // Encoded up front: the value is consumed by the handler but may
        // still need queueing if the attempt fails
        let payload =
            if options.retry_on_failure { Some(serde_json::to_value(&operation)?) } else { None };

        match handler.execute(operation).await {
            Ok(output) => Ok(Outcome::Completed(output)),
            Err(err) => match payload {
                Some(payload) if err.is_retryable() => {
                    info!(error = %err, "Online attempt failed, queueing for retry");
                    let receipt =
                        self.enqueue(O::KIND, payload, options, Some(err.message())).await?;
                    Ok(Outcome::Queued(receipt))
                }
                _ => {
                    debug!(error = %err, "Online attempt failed");
                    Ok(Outcome::Failed(err))
                }
            },
        }
    }

    /// Drop a queued operation before it runs. Returns whether it existed.
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn cancel(&self, id: &OperationId) -> GatewayResult<bool> {
        let removed = self.store.remove(id).await.map_err(|err| self.surface(err))?;
        if removed.is_some() {
            self.events.emit(OperationEvent::Cancelled { id: id.clone() });
        }
        Ok(removed.is_some())
    }

    /// Confirm a permanent failure was seen, removing the entry
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn acknowledge(&self, id: &OperationId) -> GatewayResult<Option<QueuedOperation>> {
        let removed = self.store.acknowledge(id).await.map_err(|err| self.surface(err))?;
        if removed.is_some() {
            self.events.emit(OperationEvent::Acknowledged { id: id.clone() });
        }
        Ok(removed)
    }

    /// Manually re-enqueue a permanently failed operation
    pub async fn requeue(&self, id: &OperationId) -> GatewayResult<QueuedOperation> {
        self.store.requeue(id).await.map_err(|err| self.surface(err))
    }

    async fn enqueue(
        &self,
        kind: &str,
        payload: serde_json::Value,
        options: ExecuteOptions,
        failure: Option<&str>,
    ) -> GatewayResult<QueuedReceipt> {
        let mut spec = NewOperation::new(kind, payload)
            .with_priority(options.priority)
            .with_max_retries(options.max_retries.unwrap_or(self.default_max_retries));
        spec.meta = options.meta;
        if let Some(failure) = failure {
            spec = spec.with_last_error(failure);
        }

        let queued = self.store.add(spec).await.map_err(|err| self.surface(err))?;

        self.notifier.operation_queued(&queued);
        self.events.emit(OperationEvent::Queued { id: queued.id.clone(), kind: queued.kind.clone() });
        Ok(QueuedReceipt::from(&queued))
    }

    fn surface(&self, err: QueueError) -> GatewayError {
        if let QueueError::Persistence(cause) = &err {
            warn!(error = %cause, "Durable write failed");
            self.notifier.persistence_failed(cause);
        }
        GatewayError::Queue(err)
    }
}
