//! Connection status published by the client.

use convoy_schemas::DeviceRole;
use serde::{Deserialize, Serialize};

/// Lifecycle of the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Check whether the socket is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Snapshot of the client's transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Connection lifecycle.
    pub state: ConnectionState,
    /// Failed attempts since the last role assignment.
    pub reconnect_attempt: u32,
    /// HTTP polling replaced the socket.
    pub polling_active: bool,
    /// Role handed out by the relay on the current or last connection.
    pub assigned_role: Option<DeviceRole>,
}
