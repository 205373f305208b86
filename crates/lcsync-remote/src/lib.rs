//! lcsync Remote - HTTP gateway to the platform entity API
//!
//! Provides:
//! - A bearer-authenticated JSON client for the `/entities` endpoints
//! - [`gateway::HttpRemoteGateway`], the `IRemoteGateway` adapter the sync
//!   engine runs against
//! - Per-environment token storage in the OS keyring
//!
//! ## Modules
//!
//! - [`auth`] - Token storage and resolution
//! - [`client`] - HTTP client with status mapping
//! - [`gateway`] - `IRemoteGateway` implementation

pub mod auth;
pub mod client;
pub mod gateway;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the platform API
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The token is missing, invalid or lacks access (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record changed underneath the request (409/412)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other non-success status
    #[error("Unexpected status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, or the request description when empty
        message: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Maps a non-success status and its body to an error variant
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized(message),
            StatusCode::NOT_FOUND => GatewayError::NotFound(message),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                GatewayError::Conflict(message)
            }
            s if s.is_server_error() => GatewayError::ServerError(message),
            s => GatewayError::Status {
                status: s.as_u16(),
                message,
            },
        }
    }
}
