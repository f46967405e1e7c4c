//! Drain scheduler
//!
//! Keeps the queue moving without callers having to poll:
//! - a periodic tick runs a drain pass (skipped by the processor itself when
//!   offline or already draining)
//! - every offline -> online transition triggers an immediate pass
//! - with a [`ConnectivitySource`] configured, the link is re-sampled on its
//!   own interval so the monitor notices reconnects
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fieldsync_core::{NetworkStateMonitor, QueueProcessor};
//! use fieldsync_infra::scheduling::{DrainScheduler, DrainSchedulerConfig};
//!
//! # async fn example(processor: Arc<QueueProcessor>, monitor: NetworkStateMonitor) {
//! let mut scheduler = DrainScheduler::new(processor, monitor, DrainSchedulerConfig::default());
//! scheduler.start().await.unwrap();
//! // ... application runs ...
//! scheduler.stop().await.unwrap();
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use fieldsync_core::{ConnectivitySource, NetworkStateMonitor, QueueProcessor};
use fieldsync_domain::constants::{DEFAULT_DRAIN_INTERVAL_MS, DEFAULT_PROBE_INTERVAL_MS};
use fieldsync_domain::Config;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Time allowed for the loop to finish its current pass on stop
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the drain scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSchedulerConfig {
    /// Periodic drain interval
    pub drain_interval: Duration,
    /// How often to re-sample the connectivity source
    pub probe_interval: Duration,
    /// Grace period for an in-flight pass on stop before the loop is aborted
    pub stop_timeout: Duration,
}

impl Default for DrainSchedulerConfig {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_millis(DEFAULT_DRAIN_INTERVAL_MS),
            probe_interval: Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl From<&Config> for DrainSchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            drain_interval: config.queue.drain_interval(),
            probe_interval: config.network.probe_interval(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Context for the drain loop to avoid too many arguments
struct DrainLoopContext {
    processor: Arc<QueueProcessor>,
    monitor: NetworkStateMonitor,
    source: Option<Arc<dyn ConnectivitySource>>,
}

/// Runs queue drains on a timer and on reconnect
pub struct DrainScheduler {
    processor: Arc<QueueProcessor>,
    monitor: NetworkStateMonitor,
    source: Option<Arc<dyn ConnectivitySource>>,
    config: DrainSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl std::fmt::Debug for DrainScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainScheduler")
            .field("config", &self.config)
            .field("probing", &self.source.is_some())
            .field("running", &self.is_running())
            .finish()
    }
}

impl DrainScheduler {
    pub fn new(
        processor: Arc<QueueProcessor>,
        monitor: NetworkStateMonitor,
        config: DrainSchedulerConfig,
    ) -> Self {
        Self {
            processor,
            monitor,
            source: None,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Sample `source` every `probe_interval` and feed the monitor
    #[must_use]
    pub fn with_connectivity_source(mut self, source: Arc<dyn ConnectivitySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(&self) -> &DrainSchedulerConfig {
        &self.config
    }

    /// Start the scheduler
    ///
    /// Spawns the background loop. The first drain tick fires immediately.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            drain_interval_ms = u64::try_from(self.config.drain_interval.as_millis()).unwrap_or(u64::MAX),
            probing = self.source.is_some(),
            "Starting drain scheduler"
        );

        // Fresh token so the scheduler can be restarted after stop
        self.cancellation_token = CancellationToken::new();

        let context = DrainLoopContext {
            processor: Arc::clone(&self.processor),
            monitor: self.monitor.clone(),
            source: self.source.clone(),
        };
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::drain_loop(context, config, cancel).await;
        });

        *self.task_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// Cancels the background loop and waits for the current pass to finish.
    /// A pass still running after `stop_timeout` is aborted, so the loop never
    /// outlives a stop.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running, or if the loop had to be
    /// aborted
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping drain scheduler");
        self.cancellation_token.cancel();

        if let Some(mut handle) = self.task_handle.lock().await.take() {
            let stop_timeout = self.config.stop_timeout;
            match tokio::time::timeout(stop_timeout, &mut handle).await {
                Ok(joined) => {
                    joined.map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))?;
                }
                Err(_) => {
                    warn!(
                        timeout_ms = u64::try_from(stop_timeout.as_millis()).unwrap_or(u64::MAX),
                        "Drain pass overran stop timeout, aborting"
                    );
                    handle.abort();
                    // Cancelled at its next await point
                    let _ = handle.await;
                    return Err(SchedulerError::Timeout { seconds: stop_timeout.as_secs() });
                }
            }
        }

        info!("Drain scheduler stopped");
        Ok(())
    }

    /// Check if scheduler is running
    ///
    /// A scheduler is considered running if it has an active task handle that
    /// hasn't finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn drain_loop(
        context: DrainLoopContext,
        config: DrainSchedulerConfig,
        cancel: CancellationToken,
    ) {
        let DrainLoopContext { processor, monitor, source } = context;

        let mut drain_tick = tokio::time::interval(config.drain_interval);
        drain_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut probe_tick = tokio::time::interval(config.probe_interval);
        probe_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut state_rx = monitor.watch();
        let mut was_online = state_rx.borrow_and_update().is_online;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Drain loop cancelled");
                    break;
                }
                _ = drain_tick.tick() => {
                    Self::run_drain(&processor, "timer").await;
                }
                _ = probe_tick.tick(), if source.is_some() => {
                    if let Some(source) = &source {
                        monitor.refresh(source.as_ref()).await;
                    }
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        debug!("Network monitor dropped, stopping drain loop");
                        break;
                    }
                    let is_online = state_rx.borrow_and_update().is_online;
                    if is_online && !was_online {
                        Self::run_drain(&processor, "reconnect").await;
                    }
                    was_online = is_online;
                }
            }
        }
    }

    async fn run_drain(processor: &QueueProcessor, trigger: &'static str) {
        match processor.retry_queue().await {
            Ok(report) if report.attempted > 0 => {
                debug!(trigger, attempted = report.attempted, "Scheduled drain finished");
            }
            Ok(report) => {
                debug!(trigger, skipped = ?report.skipped, "Scheduled drain had nothing to do");
            }
            Err(err) => error!(trigger, error = %err, "Scheduled drain failed"),
        }
    }
}
