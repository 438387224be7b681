//! Connectivity Events
//!
//! State changes of the remote tier, broadcast to any interested observer
//! (logging, monitoring) without changing the non-throwing cache contract.

use serde::Serialize;

// == Connection Event ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// The lazy connection attempt succeeded
    Connected,
    /// The lazy connection attempt failed; the tier stays disabled until reset
    ConnectFailed { reason: String },
    /// The runtime has no socket access, so no attempt was made
    SocketsUnavailable,
    /// A command failed after the connection was established
    OperationFailed { op: &'static str, reason: String },
    /// The connection was closed by `disconnect()`
    Disconnected,
}

/// Channel depth for connectivity events; slow receivers observe `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
