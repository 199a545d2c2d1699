//! Route provider errors.

use convoy_schemas::SchemaError;
use thiserror::Error;

/// Errors raised while fetching or decoding a route.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Route request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Routing service returned status {status}: {message}")]
    Service { status: String, message: String },

    #[error("Routing service returned no routes")]
    NoRoute,

    #[error("Invalid encoded polyline: {0}")]
    InvalidPolyline(String),

    #[error("Route failed validation: {0}")]
    Invalid(#[from] SchemaError),
}

/// Result type for route operations.
pub type RouteResult<T> = Result<T, RouteError>;
