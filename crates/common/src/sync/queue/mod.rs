// Queue instrumentation

pub mod metrics;

pub use metrics::{QueueMetrics, QueueMetricsSnapshot};
