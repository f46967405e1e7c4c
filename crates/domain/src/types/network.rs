//! Connectivity snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_enum_conversions;

/// Link class reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "wifi")]
    Wifi,
    #[serde(rename = "4g")]
    FourG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "slow-2g")]
    Slow2G,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl_domain_enum_conversions!(ConnectionType {
    Wifi => "wifi",
    FourG => "4g",
    ThreeG => "3g",
    TwoG => "2g",
    Slow2G => "slow-2g",
    Unknown => "unknown",
});

impl ConnectionType {
    /// 2G-class links are treated as slow.
    pub fn is_slow(self) -> bool {
        matches!(self, Self::TwoG | Self::Slow2G)
    }
}

/// One reading from a connectivity source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivitySignal {
    pub online: bool,
    pub connection_type: ConnectionType,
    /// Measured round trip, when the source probes the link itself.
    pub latency_ms: Option<u64>,
}

impl ConnectivitySignal {
    pub fn online() -> Self {
        Self { online: true, connection_type: ConnectionType::Unknown, latency_ms: None }
    }

    pub fn offline() -> Self {
        Self { online: false, connection_type: ConnectionType::Unknown, latency_ms: None }
    }

    #[must_use]
    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    #[must_use]
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Connectivity as seen by the rest of the system. Only the network monitor
/// produces these; everyone else reads snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub is_online: bool,
    pub is_slow_connection: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub connection_type: ConnectionType,
}

impl Default for NetworkState {
    /// Optimistic: assume online until told otherwise.
    fn default() -> Self {
        Self {
            is_online: true,
            is_slow_connection: false,
            last_connected_at: None,
            connection_type: ConnectionType::Unknown,
        }
    }
}
