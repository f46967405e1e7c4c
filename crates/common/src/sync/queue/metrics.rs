use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

/// Queue metrics for monitoring
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub total_enqueued: AtomicU64,
    pub total_completed: AtomicU64,
    pub transient_failures: AtomicU64,
    pub permanent_failures: AtomicU64,
    pub total_removed: AtomicU64,
    pub drains_started: AtomicU64,
    pub drains_skipped: AtomicU64,
    pub persistence_failures: AtomicU64,
    pub current_size: AtomicUsize,
    pub queue_depth_max: AtomicUsize,
    pub last_operation_time: AtomicU64,
}

impl QueueMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record enqueue operation
    pub fn record_enqueue(&self) {
        self.total_enqueued.fetch_add(1, AtomicOrdering::Relaxed);
        self.update_last_operation();
    }

    /// Record an operation whose executor succeeded
    pub fn record_completion(&self) {
        self.total_completed.fetch_add(1, AtomicOrdering::Relaxed);
        self.update_last_operation();
    }

    /// Record a failed attempt that will be retried
    pub fn record_transient_failure(&self) {
        self.transient_failures.fetch_add(1, AtomicOrdering::Relaxed);
        self.update_last_operation();
    }

    /// Record an operation that ran out of retries
    pub fn record_permanent_failure(&self) {
        self.permanent_failures.fetch_add(1, AtomicOrdering::Relaxed);
        self.update_last_operation();
    }

    /// Record removal (completion, cancel or acknowledgement)
    pub fn record_removal(&self) {
        self.total_removed.fetch_add(1, AtomicOrdering::Relaxed);
        self.update_last_operation();
    }

    /// Record a drain pass, `started == false` when it was skipped
    pub fn record_drain(&self, started: bool) {
        if started {
            self.drains_started.fetch_add(1, AtomicOrdering::Relaxed);
        } else {
            self.drains_skipped.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    /// Record a failed durable write
    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Update current size
    pub fn update_size(&self, size: usize) {
        self.current_size.store(size, AtomicOrdering::Relaxed);
        self.update_max_depth();
    }

    /// Update maximum depth if current exceeds it
    fn update_max_depth(&self) {
        let current = self.current_size.load(AtomicOrdering::Relaxed);
        let mut max = self.queue_depth_max.load(AtomicOrdering::Relaxed);

        while current > max {
            match self.queue_depth_max.compare_exchange_weak(
                max,
                current,
                AtomicOrdering::Relaxed,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => max = actual,
            }
        }
    }

    fn update_last_operation(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_operation_time.store(now, AtomicOrdering::Relaxed);
    }

    /// Get a snapshot of metrics
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            total_enqueued: self.total_enqueued.load(AtomicOrdering::Relaxed),
            total_completed: self.total_completed.load(AtomicOrdering::Relaxed),
            transient_failures: self.transient_failures.load(AtomicOrdering::Relaxed),
            permanent_failures: self.permanent_failures.load(AtomicOrdering::Relaxed),
            total_removed: self.total_removed.load(AtomicOrdering::Relaxed),
            drains_started: self.drains_started.load(AtomicOrdering::Relaxed),
            drains_skipped: self.drains_skipped.load(AtomicOrdering::Relaxed),
            persistence_failures: self.persistence_failures.load(AtomicOrdering::Relaxed),
            current_size: self.current_size.load(AtomicOrdering::Relaxed),
            queue_depth_max: self.queue_depth_max.load(AtomicOrdering::Relaxed),
            last_operation_time: self.last_operation_time.load(AtomicOrdering::Relaxed),
            success_rate: self.calculate_success_rate(),
        }
    }

    /// Share of executor attempts that succeeded, in percent
    fn calculate_success_rate(&self) -> f64 {
        let completed = self.total_completed.load(AtomicOrdering::Relaxed);
        let failed = self.transient_failures.load(AtomicOrdering::Relaxed)
            + self.permanent_failures.load(AtomicOrdering::Relaxed);
        let total = completed + failed;

        if total == 0 {
            return 100.0;
        }

        (completed as f64 / total as f64) * 100.0
    }
}

/// Immutable metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetricsSnapshot {
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub total_removed: u64,
    pub drains_started: u64,
    pub drains_skipped: u64,
    pub persistence_failures: u64,
    pub current_size: usize,
    pub queue_depth_max: usize,
    pub last_operation_time: u64,
    pub success_rate: f64,
}

impl QueueMetricsSnapshot {
    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Queue Metrics:\n\
            - Current Size: {} (max {})\n\
            - Total Enqueued: {}\n\
            - Completed: {} (Success: {:.1}%)\n\
            - Retries Scheduled: {}\n\
            - Permanently Failed: {}\n\
            - Drains: {} started, {} skipped",
            self.current_size,
            self.queue_depth_max,
            self.total_enqueued,
            self.total_completed,
            self.success_rate,
            self.transient_failures,
            self.permanent_failures,
            self.drains_started,
            self.drains_skipped
        )
    }
}
