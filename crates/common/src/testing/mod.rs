//! Testing utilities and helpers
//!
//! - **[`time`]**: clock abstraction with a controllable mock
//!
//! ```rust
//! use std::time::Duration;
//!
//! use fieldsync_common::testing::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!((clock.now() - start).num_seconds(), 5);
//! ```

pub mod time;

pub use time::{Clock, MockClock, SystemClock};
