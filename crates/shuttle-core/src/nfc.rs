//! NFC scan adapter boundary.
//!
//! The hardware read is a black box: `scan_once` suspends until a tag is
//! presented or the request is abandoned through `cancel_scan`.

use async_trait::async_trait;

use crate::errors::NfcError;

/// Result of a single scan request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A tag was read; carries its identifier
    Tag(String),
    /// The request was abandoned before a tag was presented
    Cancelled,
}

#[async_trait]
pub trait NfcAdapter: Send + Sync {
    /// Whether the device has NFC hardware at all.
    async fn is_available(&self) -> bool;

    /// Whether NFC is currently switched on.
    async fn is_enabled(&self) -> bool;

    /// Ask the platform to enable NFC (settings prompt). Returns the new state.
    async fn request_enable(&self) -> Result<bool, NfcError>;

    /// Wait for exactly one tag. No timeout is applied.
    async fn scan_once(&self) -> Result<ScanOutcome, NfcError>;

    /// Abandon the pending `scan_once`, if any. Must be safe to call when idle.
    async fn cancel_scan(&self);
}
