//! # FieldSync Core
//!
//! Offline-first operation queue - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (`DurableStore`, `ConnectivitySource`, `Notifier`,
//!   `OperationHandler`)
//! - `NetworkStateMonitor`, the single source of truth for connectivity
//! - `OperationQueueStore`, the durable ordered queue
//! - `QueueProcessor`, which drains the queue with bounded retry and backoff
//! - `MutationGateway`, the execute-now-or-enqueue facade callers use
//!
//! ## Architecture Principles
//! - Depends only on `fieldsync-common` and `fieldsync-domain`
//! - No file, database or HTTP code; adapters live in `fieldsync-infra`
//! - Services are constructed explicitly and shared through `Arc`

pub mod execution;
pub mod gateway;
pub mod network;
pub mod queue;

// Re-export specific items to avoid ambiguity
pub use execution::{
    handler_fn, ExecutionError, ExecutorRegistry, FnHandler, Operation, OperationHandler,
};
pub use gateway::{ExecuteOptions, GatewayError, GatewayResult, MutationGateway, Outcome, QueuedReceipt};
pub use network::{ConnectivitySource, NetworkStateMonitor, Subscription};
pub use queue::{
    DrainReport, DrainSkipReason, DurableStore, NoopNotifier, Notifier, OperationEvent,
    OperationEvents, OperationQueueStore, QueueError, QueueProcessor, QueueResult, StoreOptions,
};
