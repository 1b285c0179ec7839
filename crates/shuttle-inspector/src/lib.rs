//! Shuttle Inspector - CLI for fare inspections
//!
//! This crate provides a command-line interface for:
//! - Running an inspection session from the console
//! - Resuming or discarding unfinished inspections
//! - Listing shuttles and past inspections from the backend

pub mod cli;
pub mod config;
pub mod console;
pub mod output;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use shuttle_core::errors::ApiError;
use shuttle_core::session::SessionError;

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting and automation:
/// - 0: Success - operation completed successfully
/// - 1: General error - unspecified error occurred
/// - 2: Authentication failed - token missing, expired or rejected
/// - 3: Timeout - the backend did not answer in time
/// - 4: Connection failed - could not reach the backend
/// - 5: Invalid input - bad arguments or data provided
/// - 6: NFC unavailable - no reader on this device
/// - 7: NFC disabled - the reader is switched off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Authentication failed (exit code 2)
    AuthenticationFailed = 2,
    /// Operation timed out (exit code 3)
    Timeout = 3,
    /// Connection failed (exit code 4)
    ConnectionFailed = 4,
    /// Invalid input provided (exit code 5)
    InvalidInput = 5,
    /// No NFC reader (exit code 6)
    NfcUnavailable = 6,
    /// NFC switched off (exit code 7)
    NfcDisabled = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::AuthenticationFailed => "AUTH_FAILED",
            ExitCode::Timeout => "TIMEOUT",
            ExitCode::ConnectionFailed => "CONNECTION_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::NfcUnavailable => "NFC_UNAVAILABLE",
            ExitCode::NfcDisabled => "NFC_DISABLED",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::AuthenticationFailed => "The backend rejected the API token",
            ExitCode::Timeout => "The backend did not respond in time",
            ExitCode::ConnectionFailed => "Could not reach the backend",
            ExitCode::InvalidInput => "Invalid arguments or data provided",
            ExitCode::NfcUnavailable => "This device has no NFC reader",
            ExitCode::NfcDisabled => "NFC is switched off",
        }
    }
}

impl From<&ApiError> for ExitCode {
    fn from(e: &ApiError) -> Self {
        match e {
            ApiError::Timeout => ExitCode::Timeout,
            ApiError::Network(_) | ApiError::Server { .. } => ExitCode::ConnectionFailed,
            ApiError::Unauthorized(_) => ExitCode::AuthenticationFailed,
            ApiError::BadResponse(_) => ExitCode::GeneralError,
        }
    }
}

impl From<&SessionError> for ExitCode {
    fn from(e: &SessionError) -> Self {
        match e {
            SessionError::Network(api) => api.into(),
            SessionError::NfcUnavailable => ExitCode::NfcUnavailable,
            SessionError::NfcDisabled => ExitCode::NfcDisabled,
            SessionError::InvalidInput(_)
            | SessionError::Fare(_)
            | SessionError::PendingCheckpoint { .. }
            | SessionError::EntryNotFound(_) => ExitCode::InvalidInput,
            _ => ExitCode::GeneralError,
        }
    }
}
