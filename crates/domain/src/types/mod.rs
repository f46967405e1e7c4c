//! Domain types and models

pub mod network;
pub mod operation;

pub use network::{ConnectionType, ConnectivitySignal, NetworkState};
pub use operation::{
    NewOperation, OperationFilter, OperationId, OperationPatch, Priority, QueueStatus,
    QueuedOperation,
};
