//! Backend boundaries used by the session machine.
//!
//! The HTTP implementation lives in `http_api.rs`; tests use the recording
//! backend from `harness.rs`.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::ApiError;
use crate::types::{InspectionRecord, PassengerType, SubmitReceipt};

/// Outcome of a balance pre-authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BalanceDecision {
    Approved,
    /// Card cannot cover the cumulative fare; carries the server's message
    Denied { message: String },
}

/// Source of the passenger-type fare table.
#[async_trait]
pub trait FareRateSource: Send + Sync {
    async fn fetch_fare_rates(&self) -> Result<Vec<PassengerType>, ApiError>;
}

/// Remote balance check for a card.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Pre-authorize `fare`, the cumulative amount charged to `tag_id` in this
    /// session including the passenger about to be logged.
    async fn check_balance(&self, tag_id: &str, fare: Decimal) -> Result<BalanceDecision, ApiError>;
}

/// All-or-nothing inspection submission.
#[async_trait]
pub trait InspectionSubmitter: Send + Sync {
    async fn submit_inspection(&self, record: &InspectionRecord) -> Result<SubmitReceipt, ApiError>;
}

/// Everything the session machine needs from the backend.
pub trait FareBackend: FareRateSource + BalanceOracle + InspectionSubmitter {}

impl<T> FareBackend for T where T: FareRateSource + BalanceOracle + InspectionSubmitter {}
