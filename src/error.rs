// Error handling module
// Defines the transport-level and client-level error taxonomies

use thiserror::Error;

/// Transport-level failures: no HTTP response was received at all.
/// These are never retried by the gateway and pass through untouched.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Request timed out before a response arrived
    #[error("request timed out")]
    Timeout,

    /// TCP/TLS connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// Request could not be built or sent
    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Errors surfaced by the typed client API
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network-level failure, no response received
    #[error("network error: {0}")]
    Transport(#[from] TransportError),

    /// Backend returned a non-success status
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Authentication failed (bad credentials, expired session)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal client error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
