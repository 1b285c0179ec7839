//! Error types for collaborators at the edge of the session machine.
//!
//! `NfcError` and `ApiError` are raised by the NFC adapter and the backend
//! client respectively. The session machine wraps them in `SessionError`
//! (see `session.rs`), which is what the inspector-facing layer sees.

use thiserror::Error;

/// NFC adapter errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NfcError {
    /// Device has no NFC hardware
    #[error("NFC is not supported on this device")]
    Unavailable,

    /// Hardware present but switched off
    #[error("NFC is disabled")]
    Disabled,

    /// Reading the tag failed
    #[error("failed to read NFC tag: {0}")]
    Read(String),
}

/// Backend API errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Connection could not be established or was lost
    #[error("network error: {0}")]
    Network(String),

    /// Bearer token missing, expired, or rejected
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Server answered with an error status
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Server answered with something we could not interpret
    #[error("bad response: {0}")]
    BadResponse(String),
}

impl ApiError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout | ApiError::Network(_) => true,
            ApiError::Server { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
            ApiError::Unauthorized(_) | ApiError::BadResponse(_) => false,
        }
    }
}
