// Retry scheduling for queued operations

pub mod backoff;
pub mod constants;

pub use backoff::BackoffPolicy;
