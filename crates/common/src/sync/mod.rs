//! Synchronization primitives for the offline operation queue
//!
//! ## Submodules
//!
//! - **`retry`**: exponential backoff policy used to schedule the next
//!   attempt of a failed operation
//! - **`queue`**: lock-free counters describing queue activity

pub mod queue;
pub mod retry;

pub use queue::{QueueMetrics, QueueMetricsSnapshot};
pub use retry::BackoffPolicy;

// Re-export time abstractions from testing module
pub use crate::testing::time::{Clock, MockClock, SystemClock};
