//! Shared test helpers for `fieldsync-core` integration tests.
//!
//! In-memory persistence, a recording notifier, and a scripted executor so
//! the queue tests can focus on behaviour instead of wiring.

#![allow(dead_code)]

pub mod durable;
pub mod harness;
pub mod notifier;
pub mod operations;
