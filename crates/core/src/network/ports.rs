//! Port interfaces for connectivity signals

use async_trait::async_trait;
use fieldsync_domain::ConnectivitySignal;

/// Platform connectivity API adapted for the monitor
#[async_trait]
pub trait ConnectivitySource: Send + Sync {
    /// Take one reading. `None` means the platform could not tell, which the
    /// monitor treats as online.
    async fn sample(&self) -> Option<ConnectivitySignal>;
}
