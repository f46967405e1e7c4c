//! # FieldSync Domain
//!
//! Plain data types shared by every FieldSync crate.
//!
//! This crate contains:
//! - Queued operation records and the requests callers submit
//! - Network state snapshots
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other FieldSync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
