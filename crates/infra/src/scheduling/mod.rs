//! Background scheduling for the queue drain loop

pub mod drain_scheduler;
pub mod error;

pub use drain_scheduler::{DrainScheduler, DrainSchedulerConfig};
pub use error::{SchedulerError, SchedulerResult};
