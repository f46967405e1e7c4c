//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Queue defaults
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_STORAGE_KEY: &str = "offline_queue";
/// Relative to the working directory unless overridden by `storage.path`
pub const DEFAULT_STORAGE_DIR: &str = "fieldsync-data";

// Retry backoff (base * 2^retry_count, capped)
pub const DEFAULT_BASE_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 30_000;

// Periodic drain trigger
pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 5_000;

// Connectivity probing
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_SLOW_LATENCY_THRESHOLD_MS: u64 = 1_500;
