//! Durable ordered queue of operations
//!
//! Every mutation is applied to a copy of the in-memory entries, written
//! through the [`DurableStore`], and only then committed. A failed write
//! leaves memory exactly as it was, so the two views never diverge beyond a
//! single call.

use std::sync::Arc;

use fieldsync_common::sync::QueueMetrics;
use fieldsync_common::testing::{Clock, SystemClock};
use fieldsync_domain::constants::{DEFAULT_QUEUE_CAPACITY, DEFAULT_STORAGE_KEY};
use fieldsync_domain::{
    NewOperation, OperationFilter, OperationId, OperationPatch, QueueConfig, QueuedOperation,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::errors::{QueueError, QueueResult};
use super::ports::DurableStore;

/// Store construction settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Key the entries are saved under
    pub storage_key: String,
    pub max_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { storage_key: DEFAULT_STORAGE_KEY.to_string(), max_capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

impl From<&QueueConfig> for StoreOptions {
    fn from(config: &QueueConfig) -> Self {
        Self { storage_key: config.storage_key.clone(), max_capacity: config.max_capacity }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// Sorted by `ordering_key`
    operations: Vec<QueuedOperation>,
    next_sequence: u64,
}

impl QueueState {
    fn position(&self, id: &OperationId) -> Option<usize> {
        self.operations.iter().position(|op| &op.id == id)
    }

    fn insert_sorted(operations: &mut Vec<QueuedOperation>, operation: QueuedOperation) {
        let key = operation.ordering_key();
        let index = operations.partition_point(|op| op.ordering_key() < key);
        operations.insert(index, operation);
    }
}

/// Durable, ordered collection of queued operations
pub struct OperationQueueStore {
    durable: Arc<dyn DurableStore>,
    options: StoreOptions,
    clock: Arc<dyn Clock>,
    metrics: Arc<QueueMetrics>,
    state: Mutex<QueueState>,
}

impl std::fmt::Debug for OperationQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueueStore").field("options", &self.options).finish_non_exhaustive()
    }
}

impl OperationQueueStore {
    /// Open the store, restoring whatever was saved under the storage key
    #[instrument(skip(durable), fields(storage_key = %options.storage_key))]
    pub async fn open(durable: Arc<dyn DurableStore>, options: StoreOptions) -> QueueResult<Self> {
        Self::open_with(durable, options, Arc::new(SystemClock), Arc::new(QueueMetrics::new()))
            .await
    }

    /// Open with an explicit clock and shared metrics
    pub async fn open_with(
        durable: Arc<dyn DurableStore>,
        options: StoreOptions,
        clock: Arc<dyn Clock>,
        metrics: Arc<QueueMetrics>,
    ) -> QueueResult<Self> {
        if options.max_capacity == 0 {
            return Err(QueueError::InvalidOperation("max_capacity must be greater than 0".into()));
        }

        let entries = durable
            .load(&options.storage_key)
            .await
            .map_err(QueueError::Persistence)?;
        let state = restore(&options.storage_key, entries)?;

        if !state.operations.is_empty() {
            info!(restored = state.operations.len(), "Restored queued operations");
        }
        metrics.update_size(state.operations.len());

        Ok(Self { durable, options, clock, metrics, state: Mutex::new(state) })
    }

    /// Accept a new operation. Returns once the entry is durable.
    #[instrument(skip(self, spec), fields(kind = %spec.kind, priority = %spec.priority))]
    pub async fn add(&self, spec: NewOperation) -> QueueResult<QueuedOperation> {
        validate(&spec)?;

        let mut state = self.state.lock().await;
        if state.operations.len() >= self.options.max_capacity {
            warn!(capacity = self.options.max_capacity, "Queue full, rejecting operation");
            return Err(QueueError::CapacityExceeded { capacity: self.options.max_capacity });
        }

        let mut id = OperationId::generate();
        while state.position(&id).is_some() {
            id = OperationId::generate();
        }

        let operation =
            QueuedOperation::from_new(spec, id, state.next_sequence, self.clock.now());

        let mut next = state.operations.clone();
        QueueState::insert_sorted(&mut next, operation.clone());
        self.persist(&next).await?;

        state.operations = next;
        state.next_sequence += 1;
        self.metrics.record_enqueue();
        self.metrics.update_size(state.operations.len());

        debug!(operation_id = %operation.id, sequence = operation.sequence, "Operation queued");
        Ok(operation)
    }

    /// Remove an entry. Removing an unknown id is a no-op and writes nothing.
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn remove(&self, id: &OperationId) -> QueueResult<Option<QueuedOperation>> {
        let mut state = self.state.lock().await;
        let Some(index) = state.position(id) else {
            return Ok(None);
        };

        let mut next = state.operations.clone();
        let removed = next.remove(index);
        self.persist(&next).await?;

        state.operations = next;
        self.metrics.record_removal();
        self.metrics.update_size(state.operations.len());

        Ok(Some(removed))
    }

    /// Merge `patch` into an entry, keeping its position
    #[instrument(skip(self, patch), fields(operation_id = %id))]
    pub async fn update(
        &self,
        id: &OperationId,
        patch: OperationPatch,
    ) -> QueueResult<QueuedOperation> {
        let mut state = self.state.lock().await;
        let index = state.position(id).ok_or_else(|| QueueError::NotFound(id.clone()))?;

        let mut next = state.operations.clone();
        patch.apply(&mut next[index]);
        let updated = next[index].clone();
        self.persist(&next).await?;

        state.operations = next;
        Ok(updated)
    }

    /// Entries matching `filter`, in drain order
    pub async fn list(&self, filter: &OperationFilter) -> Vec<QueuedOperation> {
        let state = self.state.lock().await;
        state.operations.iter().filter(|op| filter.matches(op)).cloned().collect()
    }

    pub async fn get(&self, id: &OperationId) -> Option<QueuedOperation> {
        let state = self.state.lock().await;
        state.operations.iter().find(|op| &op.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.operations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.operations.is_empty()
    }

    /// `(pending, failed)`: retry-allowed entries and permanently failed ones
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        let failed = state.operations.iter().filter(|op| op.is_permanently_failed()).count();
        (state.operations.len() - failed, failed)
    }

    /// Remove a permanently failed entry once the caller has seen the failure.
    ///
    /// Unknown ids are a no-op. Entries still eligible for retry are refused.
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn acknowledge(&self, id: &OperationId) -> QueueResult<Option<QueuedOperation>> {
        {
            let state = self.state.lock().await;
            match state.operations.iter().find(|op| &op.id == id) {
                None => return Ok(None),
                Some(op) if !op.is_permanently_failed() => {
                    return Err(QueueError::NotPermanentlyFailed(id.clone()));
                }
                Some(_) => {}
            }
        }
        self.remove_failed(id).await
    }

    /// Give a permanently failed entry a fresh retry budget in its original
    /// position
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn requeue(&self, id: &OperationId) -> QueueResult<QueuedOperation> {
        let mut state = self.state.lock().await;
        let index = state.position(id).ok_or_else(|| QueueError::NotFound(id.clone()))?;
        if !state.operations[index].is_permanently_failed() {
            return Err(QueueError::NotPermanentlyFailed(id.clone()));
        }

        let mut next = state.operations.clone();
        OperationPatch::new()
            .retry_count(0)
            .retry_allowed(true)
            .next_attempt_at(None)
            .apply(&mut next[index]);
        let requeued = next[index].clone();
        self.persist(&next).await?;

        state.operations = next;
        info!("Permanently failed operation re-enqueued");
        Ok(requeued)
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    // Re-checks under the lock: the entry may have been requeued in between
    async fn remove_failed(&self, id: &OperationId) -> QueueResult<Option<QueuedOperation>> {
        let mut state = self.state.lock().await;
        let Some(index) = state.position(id) else {
            return Ok(None);
        };
        if !state.operations[index].is_permanently_failed() {
            return Err(QueueError::NotPermanentlyFailed(id.clone()));
        }

        let mut next = state.operations.clone();
        let removed = next.remove(index);
        self.persist(&next).await?;

        state.operations = next;
        self.metrics.record_removal();
        self.metrics.update_size(state.operations.len());
        Ok(Some(removed))
    }

    async fn persist(&self, operations: &[QueuedOperation]) -> QueueResult<()> {
        let entries = operations
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()
            .map_err(|err| QueueError::Persistence(err.into()))?;

        if let Err(err) = self.durable.save(&self.options.storage_key, &entries).await {
            self.metrics.record_persistence_failure();
            warn!(error = %err, storage_key = %self.options.storage_key, "Durable write failed");
            return Err(QueueError::Persistence(err));
        }
        Ok(())
    }
}

fn validate(spec: &NewOperation) -> QueueResult<()> {
    if spec.kind.trim().is_empty() {
        return Err(QueueError::InvalidOperation("kind cannot be empty".into()));
    }
    if spec.max_retries == 0 {
        return Err(QueueError::InvalidOperation("max_retries must be at least 1".into()));
    }
    Ok(())
}

fn restore(key: &str, entries: Vec<Value>) -> QueueResult<QueueState> {
    let mut operations = Vec::with_capacity(entries.len());
    for entry in entries {
        let operation: QueuedOperation = serde_json::from_value(entry)
            .map_err(|err| QueueError::Corrupted { key: key.to_string(), message: err.to_string() })?;
        if operations.iter().any(|op: &QueuedOperation| op.id == operation.id) {
            return Err(QueueError::Corrupted {
                key: key.to_string(),
                message: format!("duplicate operation id {}", operation.id),
            });
        }
        operations.push(operation);
    }

    operations.sort_by_key(QueuedOperation::ordering_key);
    let next_sequence = operations.iter().map(|op| op.sequence + 1).max().unwrap_or(0);

    Ok(QueueState { operations, next_sequence })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use fieldsync_common::error::{CommonError, CommonResult};
    use fieldsync_domain::Priority;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct MemoryDurable {
        data: SyncMutex<HashMap<String, Vec<Value>>>,
        fail_saves: SyncMutex<bool>,
        saves: SyncMutex<usize>,
    }

    #[async_trait]
    impl DurableStore for MemoryDurable {
        async fn load(&self, key: &str) -> CommonResult<Vec<Value>> {
            Ok(self.data.lock().get(key).cloned().unwrap_or_default())
        }

        async fn save(&self, key: &str, entries: &[Value]) -> CommonResult<()> {
            if *self.fail_saves.lock() {
                return Err(CommonError::persistence_op("save", "disk full"));
            }
            *self.saves.lock() += 1;
            self.data.lock().insert(key.to_string(), entries.to_vec());
            Ok(())
        }
    }

    async fn open(durable: &Arc<MemoryDurable>) -> OperationQueueStore {
        OperationQueueStore::open(durable.clone(), StoreOptions::default()).await.unwrap()
    }

    fn spec(kind: &str, priority: Priority) -> NewOperation {
        NewOperation::new(kind, json!({ "kind": kind })).with_priority(priority)
    }

    #[tokio::test]
    async fn test_add_persists_before_returning() {
        let durable = Arc::new(MemoryDurable::default());
        let store = open(&durable).await;

        let op = store.add(spec("save", Priority::Medium)).await.unwrap();

        assert_eq!(op.retry_count, 0);
        assert!(op.retry_allowed);
        let saved = durable.data.lock().get(DEFAULT_STORAGE_KEY).cloned().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0]["id"], json!(op.id.as_str()));
    }

    #[tokio::test]
    async fn test_list_orders_by_priority_then_insertion() {
        let store = open(&Arc::new(MemoryDurable::default())).await;

        store.add(spec("low", Priority::Low)).await.unwrap();
        store.add(spec("high", Priority::High)).await.unwrap();
        store.add(spec("medium-1", Priority::Medium)).await.unwrap();
        store.add(spec("medium-2", Priority::Medium)).await.unwrap();

        let kinds: Vec<String> =
            store.list(&OperationFilter::default()).await.into_iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec!["high", "medium-1", "medium-2", "low"]);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let durable = Arc::new(MemoryDurable::default());
        let store = open(&durable).await;
        let op = store.add(spec("save", Priority::Medium)).await.unwrap();

        assert!(store.remove(&op.id).await.unwrap().is_some());
        let saves_after_first = *durable.saves.lock();

        assert!(store.remove(&op.id).await.unwrap().is_none());
        assert_eq!(*durable.saves.lock(), saves_after_first, "second remove writes nothing");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_untouched() {
        let durable = Arc::new(MemoryDurable::default());
        let store = open(&durable).await;
        let op = store.add(spec("save", Priority::Medium)).await.unwrap();

        *durable.fail_saves.lock() = true;

        let err = store.add(spec("other", Priority::High)).await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert_eq!(store.len().await, 1);

        let err = store.remove(&op.id).await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert!(store.get(&op.id).await.is_some());

        let err =
            store.update(&op.id, OperationPatch::new().retry_count(1)).await.unwrap_err();
        assert!(err.is_persistence_failure());
        assert_eq!(store.get(&op.id).await.unwrap().retry_count, 0);
        assert_eq!(store.metrics().snapshot().persistence_failures, 3);
    }

    #[tokio::test]
    async fn test_update_missing_id_is_not_found() {
        let store = open(&Arc::new(MemoryDurable::default())).await;

        let err = store
            .update(&OperationId::from("missing"), OperationPatch::new().retry_count(1))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reopen_restores_order_and_sequence() {
        let durable = Arc::new(MemoryDurable::default());
        {
            let store = open(&durable).await;
            store.add(spec("b", Priority::Medium)).await.unwrap();
            store.add(spec("a", Priority::High)).await.unwrap();
        }

        let store = open(&durable).await;
        let c = store.add(spec("c", Priority::Medium)).await.unwrap();

        assert_eq!(c.sequence, 2);
        let kinds: Vec<String> =
            store.list(&OperationFilter::default()).await.into_iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_entries() {
        let durable = Arc::new(MemoryDurable::default());
        durable.data.lock().insert(DEFAULT_STORAGE_KEY.into(), vec![json!({"id": 5})]);

        let err = OperationQueueStore::open(durable, StoreOptions::default()).await.unwrap_err();

        assert!(matches!(err, QueueError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn test_capacity_and_validation() {
        let durable: Arc<dyn DurableStore> = Arc::new(MemoryDurable::default());
        let store = OperationQueueStore::open(
            durable,
            StoreOptions { max_capacity: 1, ..StoreOptions::default() },
        )
        .await
        .unwrap();

        store.add(spec("save", Priority::Medium)).await.unwrap();
        let err = store.add(spec("save", Priority::Medium)).await.unwrap_err();
        assert!(matches!(err, QueueError::CapacityExceeded { capacity: 1 }));

        let err = store.add(spec("", Priority::Medium)).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_zero_max_retries_rejected() {
        let store = open(&Arc::new(MemoryDurable::default())).await;

        let err =
            store.add(spec("save", Priority::Medium).with_max_retries(0)).await.unwrap_err();

        assert!(matches!(err, QueueError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_acknowledge_and_requeue() {
        let store = open(&Arc::new(MemoryDurable::default())).await;
        let op = store.add(spec("save", Priority::Medium).with_max_retries(1)).await.unwrap();

        let err = store.acknowledge(&op.id).await.unwrap_err();
        assert!(matches!(err, QueueError::NotPermanentlyFailed(_)));

        store.update(&op.id, OperationPatch::new().retry_count(1)).await.unwrap();
        assert_eq!(store.counts().await, (0, 1));

        let requeued = store.requeue(&op.id).await.unwrap();
        assert_eq!(requeued.retry_count, 0);
        assert!(requeued.retry_allowed);
        assert_eq!(requeued.sequence, op.sequence);

        store.update(&op.id, OperationPatch::new().retry_count(1)).await.unwrap();
        let acknowledged = store.acknowledge(&op.id).await.unwrap();
        assert_eq!(acknowledged.map(|op| op.id), Some(op.id.clone()));
        assert!(store.acknowledge(&op.id).await.unwrap().is_none());
    }
}
