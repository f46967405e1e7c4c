//! Caller-facing execute-or-enqueue facade

pub mod errors;
pub mod service;

pub use errors::{GatewayError, GatewayResult};
pub use service::{ExecuteOptions, MutationGateway, Outcome, QueuedReceipt};
