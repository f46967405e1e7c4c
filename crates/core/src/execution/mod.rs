//! Executors for queued operation kinds

pub mod errors;
pub mod ports;
pub mod registry;

pub use errors::ExecutionError;
pub use ports::{handler_fn, FnHandler, Operation, OperationHandler};
pub use registry::ExecutorRegistry;
