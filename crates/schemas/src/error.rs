//! Error types for schema validation and wire decoding.

use thiserror::Error;

use crate::message::MessageType;

/// Route and value validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Route has {0} coordinates (need at least 2)")]
    TooFewCoordinates(usize),

    #[error("Route coordinate {index} is not finite")]
    NonFiniteCoordinate { index: usize },

    #[error("Invalid route distance: {0} m")]
    InvalidDistance(f64),

    #[error("Legs sum to {legs} m but route distance is {route} m")]
    LegDistanceMismatch { legs: f64, route: f64 },

    #[error("Invalid device role: {0}")]
    InvalidRole(String),
}

/// Errors raised while encoding or decoding a convoy message.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: MessageType,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid sender: {0}")]
    InvalidOrigin(#[from] SchemaError),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
