use std::sync::Arc;

use fieldsync_common::sync::{BackoffPolicy, QueueMetrics};
use fieldsync_common::testing::MockClock;
use fieldsync_core::{
    ExecutorRegistry, MutationGateway, NetworkStateMonitor, OperationEvents, OperationQueueStore,
    QueueProcessor, StoreOptions,
};

use super::durable::MemoryDurableStore;
use super::notifier::RecordingNotifier;
use super::operations::{SaveNote, ScriptedHandler};

/// Fully wired gateway, store, and processor over in-memory persistence.
pub struct Harness {
    pub clock: MockClock,
    pub durable: Arc<MemoryDurableStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub monitor: NetworkStateMonitor,
    pub registry: Arc<ExecutorRegistry>,
    pub store: Arc<OperationQueueStore>,
    pub events: OperationEvents,
    pub gateway: MutationGateway,
    pub processor: Arc<QueueProcessor>,
    pub handler: ScriptedHandler,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_handler(ScriptedHandler::new()).await
    }

    pub async fn with_handler(handler: ScriptedHandler) -> Self {
        Self::build(handler, Arc::new(MemoryDurableStore::new())).await
    }

    /// Wire everything over an existing durable store, as after a restart
    pub async fn build(handler: ScriptedHandler, durable: Arc<MemoryDurableStore>) -> Self {
        let clock = MockClock::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let monitor = NetworkStateMonitor::with_clock(Arc::new(clock.clone()));
        let registry = Arc::new(ExecutorRegistry::new());
        registry.register::<SaveNote, _>(handler.clone());

        let store = Arc::new(
            OperationQueueStore::open_with(
                durable.clone(),
                StoreOptions::default(),
                Arc::new(clock.clone()),
                Arc::new(QueueMetrics::new()),
            )
            .await
            .expect("store opens"),
        );

        let events = OperationEvents::default();
        let gateway = MutationGateway::new(
            monitor.clone(),
            Arc::clone(&store),
            Arc::clone(&registry),
            notifier.clone(),
        )
        .with_events(events.clone());

        let processor = Arc::new(
            QueueProcessor::new(
                Arc::clone(&store),
                monitor.clone(),
                Arc::clone(&registry),
                notifier.clone(),
            )
            .with_backoff(BackoffPolicy::default())
            .with_events(events.clone())
            .with_clock(Arc::new(clock.clone())),
        );

        Self {
            clock,
            durable,
            notifier,
            monitor,
            registry,
            store,
            events,
            gateway,
            processor,
            handler,
        }
    }
}
