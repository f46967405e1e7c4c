//! # FieldSync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - Durable stores (JSON file, SQLite, in-memory)
//! - HTTP connectivity probe
//! - Tracing-backed notifier
//! - Drain scheduler (periodic and reconnect-triggered drains)
//! - Configuration loading and logging setup
//! - `OfflineRuntime`, which wires everything together
//!
//! ## Architecture
//! - Implements traits defined in `fieldsync-core`
//! - Contains all "impure" code (file system, database, network)

pub mod config;
pub mod connectivity;
pub mod errors;
pub mod notifier;
pub mod observability;
pub mod runtime;
pub mod scheduling;
pub mod storage;

// Re-export commonly used items
pub use connectivity::HttpProbeSource;
pub use errors::InfraError;
pub use notifier::TracingNotifier;
pub use observability::init_tracing;
pub use runtime::{OfflineRuntime, OfflineRuntimeBuilder, RuntimeError, RuntimeResult};
pub use scheduling::{DrainScheduler, DrainSchedulerConfig, SchedulerError};
pub use storage::{open_durable_store, FileDurableStore, InMemoryDurableStore, SqliteDurableStore};
