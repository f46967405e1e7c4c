//! Modular common utilities shared across FieldSync crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors and error classification
//! - `runtime`: backoff policy, queue metrics, and the `testing` clock
//!   abstraction (`SystemClock` for production, `MockClock` for tests)
//! - `test-utils`: implies `runtime`; declared by dev-dependencies that need
//!   `MockClock`

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod sync;

// Clock abstraction, shared by runtime code and test suites
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use sync::{BackoffPolicy, QueueMetrics, QueueMetricsSnapshot};
#[cfg(feature = "runtime")]
pub use testing::time::{Clock, MockClock, SystemClock};
