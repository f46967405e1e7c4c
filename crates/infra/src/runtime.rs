//! Wiring for the whole offline stack
//!
//! [`OfflineRuntime`] builds the monitor, store, processor, gateway and drain
//! scheduler from a [`Config`] so an application only has to register its
//! operation handlers and call [`OfflineRuntime::start`].

use std::sync::Arc;
use std::time::Duration;

use fieldsync_common::error::CommonError;
use fieldsync_common::sync::{BackoffPolicy, QueueMetrics};
use fieldsync_common::testing::{Clock, SystemClock};
use fieldsync_core::{
    ConnectivitySource, DurableStore, ExecutorRegistry, MutationGateway, NetworkStateMonitor,
    Notifier, OperationEvents, OperationQueueStore, QueueError, QueueProcessor, StoreOptions,
};
use fieldsync_domain::{Config, FieldSyncError, QueueStatus};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::connectivity::HttpProbeSource;
use crate::notifier::TracingNotifier;
use crate::scheduling::{DrainScheduler, DrainSchedulerConfig, SchedulerError};
use crate::storage::open_durable_store;

/// Errors raised while assembling or running the stack
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] FieldSyncError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Builder for [`OfflineRuntime`]
pub struct OfflineRuntimeBuilder {
    config: Config,
    registry: Arc<ExecutorRegistry>,
    notifier: Arc<dyn Notifier>,
    durable: Option<Arc<dyn DurableStore>>,
    source: Option<Arc<dyn ConnectivitySource>>,
    clock: Arc<dyn Clock>,
}

impl OfflineRuntimeBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(ExecutorRegistry::new()),
            notifier: Arc::new(TracingNotifier),
            durable: None,
            source: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use an existing handler registry instead of an empty one
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ExecutorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Override the store selected by `storage` in the config
    #[must_use]
    pub fn with_durable_store(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Override the HTTP probe built from `network.probe_url`
    #[must_use]
    pub fn with_connectivity_source(mut self, source: Arc<dyn ConnectivitySource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the config, restore the queue and wire every component
    ///
    /// # Errors
    /// Fails on invalid configuration, an unreachable durable store, or a
    /// saved queue that cannot be decoded.
    pub async fn build(self) -> RuntimeResult<OfflineRuntime> {
        let Self { config, registry, notifier, durable, source, clock } = self;
        config.validate()?;

        let durable = match durable {
            Some(durable) => durable,
            None => open_durable_store(&config.storage)?,
        };

        let store = Arc::new(
            OperationQueueStore::open_with(
                durable,
                StoreOptions::from(&config.queue),
                Arc::clone(&clock),
                Arc::new(QueueMetrics::new()),
            )
            .await?,
        );

        let monitor = NetworkStateMonitor::with_clock(Arc::clone(&clock))
            .with_slow_latency_threshold(Duration::from_millis(
                config.network.slow_latency_threshold_ms,
            ));

        let source = match (source, &config.network.probe_url) {
            (Some(source), _) => Some(source),
            (None, Some(url)) => {
                let probe = HttpProbeSource::new(url.as_str(), config.network.probe_timeout())?;
                Some(Arc::new(probe) as Arc<dyn ConnectivitySource>)
            }
            (None, None) => None,
        };

        let backoff =
            BackoffPolicy::new(config.queue.base_retry_delay(), config.queue.max_retry_delay())?
                .with_jitter_factor(config.queue.jitter_factor);

        let events = OperationEvents::default();

        let processor = Arc::new(
            QueueProcessor::new(
                Arc::clone(&store),
                monitor.clone(),
                Arc::clone(&registry),
                Arc::clone(&notifier),
            )
            .with_backoff(backoff)
            .with_events(events.clone())
            .with_clock(clock),
        );

        let gateway = MutationGateway::new(
            monitor.clone(),
            Arc::clone(&store),
            Arc::clone(&registry),
            notifier,
        )
        .with_events(events.clone())
        .with_default_max_retries(config.queue.default_max_retries);

        let mut scheduler = DrainScheduler::new(
            Arc::clone(&processor),
            monitor.clone(),
            DrainSchedulerConfig::from(&config),
        );
        if let Some(source) = source {
            scheduler = scheduler.with_connectivity_source(source);
        }

        info!(
            backend = %config.storage.backend,
            restored = store.len().await,
            "Offline runtime assembled"
        );

        Ok(OfflineRuntime {
            config,
            monitor,
            registry,
            store,
            events,
            processor,
            gateway,
            scheduler: Mutex::new(scheduler),
        })
    }
}

/// Fully wired offline-first stack
pub struct OfflineRuntime {
    config: Config,
    monitor: NetworkStateMonitor,
    registry: Arc<ExecutorRegistry>,
    store: Arc<OperationQueueStore>,
    events: OperationEvents,
    processor: Arc<QueueProcessor>,
    gateway: MutationGateway,
    scheduler: Mutex<DrainScheduler>,
}

impl std::fmt::Debug for OfflineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineRuntime").field("config", &self.config).finish_non_exhaustive()
    }
}

impl OfflineRuntime {
    pub fn builder(config: Config) -> OfflineRuntimeBuilder {
        OfflineRuntimeBuilder::new(config)
    }

    /// Start the background drain scheduler
    pub async fn start(&self) -> RuntimeResult<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    /// Stop the background drain scheduler. Queued work stays durable.
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_running() {
            scheduler.stop().await?;
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.lock().await.is_running()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gateway(&self) -> &MutationGateway {
        &self.gateway
    }

    pub fn processor(&self) -> &Arc<QueueProcessor> {
        &self.processor
    }

    pub fn monitor(&self) -> &NetworkStateMonitor {
        &self.monitor
    }

    /// Register handlers here before queued work needs them
    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<OperationQueueStore> {
        &self.store
    }

    pub fn events(&self) -> &OperationEvents {
        &self.events
    }

    pub async fn status(&self) -> QueueStatus {
        self.processor.status().await
    }
}
