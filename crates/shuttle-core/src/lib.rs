//! Shuttle Core - on-device fare inspection sessions.
//!
//! This crate implements:
//! - The inspection session state machine and its driver loop
//! - Fare computation from a per-session rate cache
//! - Checkpoint storage for crash recovery
//! - Collaborator boundaries for NFC, balance checks, and submission
//! - A bearer-token HTTP client for the fare backend

#![forbid(unsafe_code)]

// Core state machine
pub mod session;
pub mod driver;

// Domain
pub mod fare;
pub mod types;
pub mod clock;

// Collaborator boundaries
pub mod api;
pub mod nfc;
pub mod store;

// Supporting modules
pub mod errors;
pub mod harness;

// Optional backend client
#[cfg(feature = "http-api")]
pub mod http_api;

// Optional storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
