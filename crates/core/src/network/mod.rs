//! Connectivity tracking

pub mod monitor;
pub mod ports;

pub use monitor::{NetworkListener, NetworkStateMonitor, Subscription};
pub use ports::ConnectivitySource;
