//! Sync client errors.

use convoy_schemas::ProtocolError;
use thiserror::Error;

/// Errors raised by the sync client.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connection attempt timed out after {0} ms")]
    ConnectTimeout(u64),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("No tokio runtime to run the client on: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::WebSocket(Box::new(e))
    }
}

/// Result type for sync client operations.
pub type SyncResult<T> = Result<T, SyncError>;
