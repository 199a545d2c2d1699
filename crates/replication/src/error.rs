//! Replication errors.

use convoy_schemas::DeviceRole;
use thiserror::Error;

/// Errors raised by replication operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    #[error("No open prompt with id {0}")]
    UnknownPrompt(u64),

    #[error("No pending stop request with id {0}")]
    UnknownStopRequest(String),

    #[error("Role {0} cannot {1}")]
    NotPermitted(DeviceRole, &'static str),
}

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;
