//! Durable operation queue and its drain loop

pub mod errors;
pub mod events;
pub mod ports;
pub mod processor;
pub mod store;

pub use errors::{QueueError, QueueResult};
pub use events::{OperationEvent, OperationEvents};
pub use ports::{DurableStore, NoopNotifier, Notifier};
pub use processor::{DrainReport, DrainSkipReason, QueueProcessor};
pub use store::{OperationQueueStore, StoreOptions};
