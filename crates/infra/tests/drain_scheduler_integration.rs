//! Timer and reconnect triggers of `DrainScheduler`.

use std::sync::Arc;
use std::time::Duration;

use fieldsync_core::{
    ExecuteOptions, ExecutionError, ExecutorRegistry, MutationGateway, NetworkStateMonitor,
    NoopNotifier, Operation, OperationQueueStore, QueueProcessor, StoreOptions,
};
use fieldsync_infra::{DrainScheduler, DrainSchedulerConfig, InMemoryDurableStore, SchedulerError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ping(u32);

impl Operation for Ping {
    const KIND: &'static str = "ping";
    type Output = ();
}

/// Never completes once started
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stall;

impl Operation for Stall {
    const KIND: &'static str = "stall";
    type Output = ();
}

struct Stack {
    monitor: NetworkStateMonitor,
    store: Arc<OperationQueueStore>,
    gateway: MutationGateway,
    processor: Arc<QueueProcessor>,
    seen: Arc<Mutex<Vec<u32>>>,
}

async fn stack() -> Stack {
    let monitor = NetworkStateMonitor::new();
    let store = Arc::new(
        OperationQueueStore::open(Arc::new(InMemoryDurableStore::new()), StoreOptions::default())
            .await
            .unwrap(),
    );
    let registry = Arc::new(ExecutorRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    registry.register_fn(move |ping: Ping| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(ping.0);
            Ok::<_, ExecutionError>(())
        }
    });
    registry.register_fn(|_: Stall| std::future::pending::<Result<(), ExecutionError>>());

    let notifier = Arc::new(NoopNotifier);
    let gateway = MutationGateway::new(
        monitor.clone(),
        Arc::clone(&store),
        Arc::clone(&registry),
        notifier.clone(),
    );
    let processor =
        Arc::new(QueueProcessor::new(Arc::clone(&store), monitor.clone(), registry, notifier));

    Stack { monitor, store, gateway, processor, seen }
}

async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_reconnect_triggers_a_drain() {
    let stack = stack().await;
    stack.monitor.set_online(false);
    for n in 0..3 {
        stack.gateway.execute(Ping(n), ExecuteOptions::default()).await.unwrap();
    }

    // Long timer so only the reconnect can drain
    let config = DrainSchedulerConfig {
        drain_interval: Duration::from_secs(3600),
        probe_interval: Duration::from_secs(3600),
        ..DrainSchedulerConfig::default()
    };
    let mut scheduler =
        DrainScheduler::new(Arc::clone(&stack.processor), stack.monitor.clone(), config);
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(stack.seen.lock().is_empty());

    stack.monitor.set_online(true);
    assert!(eventually(|| stack.seen.lock().len() == 3).await);
    assert_eq!(*stack.seen.lock(), vec![0, 1, 2]);

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_timer_drains_while_online() {
    let stack = stack().await;
    stack.monitor.set_online(false);
    stack.gateway.execute(Ping(7), ExecuteOptions::default()).await.unwrap();

    let config = DrainSchedulerConfig {
        drain_interval: Duration::from_millis(20),
        probe_interval: Duration::from_secs(3600),
        ..DrainSchedulerConfig::default()
    };
    let mut scheduler =
        DrainScheduler::new(Arc::clone(&stack.processor), stack.monitor.clone(), config);
    scheduler.start().await.unwrap();

    // Queue stays put while offline, whatever the timer does
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stack.store.len().await, 1);

    stack.monitor.set_online(true);
    assert!(eventually(|| *stack.seen.lock() == vec![7]).await);

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let stack = stack().await;
    let mut scheduler = DrainScheduler::new(
        Arc::clone(&stack.processor),
        stack.monitor.clone(),
        DrainSchedulerConfig::default(),
    );

    assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));

    scheduler.start().await.unwrap();
    assert!(scheduler.is_running());
    assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());

    // Restart after stop
    scheduler.start().await.unwrap();
    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_timeout_aborts_the_running_pass() {
    let stack = stack().await;
    stack.monitor.set_online(false);
    stack.gateway.execute(Stall, ExecuteOptions::default()).await.unwrap();

    let config = DrainSchedulerConfig {
        drain_interval: Duration::from_secs(3600),
        probe_interval: Duration::from_secs(3600),
        stop_timeout: Duration::from_millis(50),
    };
    let mut scheduler =
        DrainScheduler::new(Arc::clone(&stack.processor), stack.monitor.clone(), config);
    scheduler.start().await.unwrap();

    stack.monitor.set_online(true);
    assert!(eventually(|| stack.processor.is_processing()).await);

    assert!(matches!(scheduler.stop().await, Err(SchedulerError::Timeout { .. })));
    assert!(!scheduler.is_running());
    // The aborted pass released the processor instead of running on detached
    assert!(!stack.processor.is_processing());
    assert_eq!(stack.store.len().await, 1);

    scheduler.start().await.unwrap();
    scheduler.stop().await.ok();
}
