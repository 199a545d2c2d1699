//! Relay errors.

use std::net::SocketAddr;

use convoy_schemas::ProtocolError;
use thiserror::Error;

/// Errors raised by the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0} messages are handled by the relay and cannot be broadcast")]
    NotRoutable(convoy_schemas::MessageType),

    #[error("Cannot route {0} without a sender role")]
    UnknownSender(convoy_schemas::MessageType),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
