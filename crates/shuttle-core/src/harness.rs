//! Test doubles for the session machine's collaborators.
//!
//! Used by the unit tests, the integration tests under `tests/`, and the
//! inspector CLI's own tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, Notify};

use crate::api::{BalanceDecision, BalanceOracle, FareRateSource, InspectionSubmitter};
use crate::clock::Clock;
use crate::errors::{ApiError, NfcError};
use crate::nfc::{NfcAdapter, ScanOutcome};
use crate::store::{Checkpoint, CheckpointStore, InMemoryCheckpointStore, StoreError};
use crate::types::{InspectionRecord, PassengerType, Plate, SubmitReceipt};

// ============================================================================
// Scripted NFC Adapter
// ============================================================================

/// NFC adapter fed from a queue of scripted outcomes.
///
/// `scan_once` pops the next outcome, or waits until one is pushed or the scan
/// is cancelled.
pub struct ScriptedNfc {
    available: bool,
    enabled: AtomicBool,
    queue: Mutex<VecDeque<Result<ScanOutcome, NfcError>>>,
    wake: Notify,
    in_flight: AtomicUsize,
    cancel_requested: AtomicBool,
    cancel_calls: AtomicUsize,
    scan_calls: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedNfc {
    pub fn new() -> Self {
        Self {
            available: true,
            enabled: AtomicBool::new(true),
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            in_flight: AtomicUsize::new(0),
            cancel_requested: AtomicBool::new(false),
            cancel_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
        }
    }

    /// Device without NFC hardware.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            enabled: AtomicBool::new(false),
            ..Self::new()
        }
    }

    pub fn with_tags<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let nfc = Self::new();
        let queue: VecDeque<_> = tags
            .into_iter()
            .map(|t| Ok(ScanOutcome::Tag(t.into())))
            .collect();
        Self {
            queue: Mutex::new(queue),
            ..nfc
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub async fn push_tag(&self, tag: impl Into<String>) {
        self.push(Ok(ScanOutcome::Tag(tag.into()))).await;
    }

    pub async fn push(&self, outcome: Result<ScanOutcome, NfcError>) {
        self.queue.lock().await.push_back(outcome);
        self.wake.notify_waiters();
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedNfc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NfcAdapter for ScriptedNfc {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn is_enabled(&self) -> bool {
        self.available && self.enabled.load(Ordering::SeqCst)
    }

    async fn request_enable(&self) -> Result<bool, NfcError> {
        if !self.available {
            return Err(NfcError::Unavailable);
        }
        self.enabled.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn scan_once(&self) -> Result<ScanOutcome, NfcError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        self.cancel_requested.store(false, Ordering::SeqCst);

        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(next) = self.queue.lock().await.pop_front() {
                return next;
            }
            if self.cancel_requested.swap(false, Ordering::SeqCst) {
                return Ok(ScanOutcome::Cancelled);
            }
            notified.await;
        }
    }

    async fn cancel_scan(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            self.cancel_requested.store(true, Ordering::SeqCst);
            self.wake.notify_waiters();
        }
    }
}

// ============================================================================
// Recording Backend
// ============================================================================

/// In-process backend that records every call.
///
/// Cards have unlimited balance unless `set_balance` says otherwise.
pub struct MockBackend {
    rates: Vec<PassengerType>,
    balances: Mutex<HashMap<String, Decimal>>,
    rates_error: Mutex<Option<ApiError>>,
    balance_error: Mutex<Option<ApiError>>,
    submit_error: Mutex<Option<ApiError>>,
    balance_calls: Mutex<Vec<(String, Decimal)>>,
    submissions: Mutex<Vec<InspectionRecord>>,
    next_id: AtomicU64,
}

impl MockBackend {
    pub fn new(rates: Vec<PassengerType>) -> Self {
        Self {
            rates,
            balances: Mutex::new(HashMap::new()),
            rates_error: Mutex::new(None),
            balance_error: Mutex::new(None),
            submit_error: Mutex::new(None),
            balance_calls: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
        }
    }

    /// Regular 10.00 and Student 8.00.
    pub fn with_standard_rates() -> Self {
        Self::new(standard_rates())
    }

    pub async fn set_balance(&self, tag_id: impl Into<String>, balance: Decimal) {
        self.balances.lock().await.insert(tag_id.into(), balance);
    }

    pub async fn fail_fare_rates(&self, error: Option<ApiError>) {
        *self.rates_error.lock().await = error;
    }

    pub async fn fail_balance_checks(&self, error: Option<ApiError>) {
        *self.balance_error.lock().await = error;
    }

    pub async fn fail_submissions(&self, error: Option<ApiError>) {
        *self.submit_error.lock().await = error;
    }

    /// `(tag_id, cumulative fare)` for every balance check, in call order.
    pub async fn balance_checks(&self) -> Vec<(String, Decimal)> {
        self.balance_calls.lock().await.clone()
    }

    /// Successfully submitted records.
    pub async fn submissions(&self) -> Vec<InspectionRecord> {
        self.submissions.lock().await.clone()
    }
}

/// `(label, rate in centavos)`
const STANDARD_RATES: [(&str, i64); 2] = [("Regular", 1000), ("Student", 800)];

pub fn standard_rates() -> Vec<PassengerType> {
    STANDARD_RATES
        .iter()
        .map(|(label, cents)| PassengerType::new(*label, Decimal::new(*cents, 2)))
        .collect()
}

#[async_trait]
impl FareRateSource for MockBackend {
    async fn fetch_fare_rates(&self) -> Result<Vec<PassengerType>, ApiError> {
        if let Some(e) = self.rates_error.lock().await.clone() {
            return Err(e);
        }
        Ok(self.rates.clone())
    }
}

#[async_trait]
impl BalanceOracle for MockBackend {
    async fn check_balance(&self, tag_id: &str, fare: Decimal) -> Result<BalanceDecision, ApiError> {
        self.balance_calls
            .lock()
            .await
            .push((tag_id.to_string(), fare));

        if let Some(e) = self.balance_error.lock().await.clone() {
            return Err(e);
        }
        match self.balances.lock().await.get(tag_id) {
            Some(balance) if fare > *balance => Ok(BalanceDecision::Denied {
                message: "Insufficient balance".into(),
            }),
            _ => Ok(BalanceDecision::Approved),
        }
    }
}

#[async_trait]
impl InspectionSubmitter for MockBackend {
    async fn submit_inspection(&self, record: &InspectionRecord) -> Result<SubmitReceipt, ApiError> {
        if let Some(e) = self.submit_error.lock().await.clone() {
            return Err(e);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().await.push(record.clone());
        Ok(SubmitReceipt {
            inspection_id: id.to_string(),
        })
    }
}

// ============================================================================
// Clock and Store Doubles
// ============================================================================

/// Clock frozen at a settable instant.
pub struct FixedClock {
    unix_secs: AtomicI64,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            unix_secs: AtomicI64::new(instant.timestamp()),
        }
    }

    /// Parse an RFC 3339 instant; an unparseable string yields the Unix epoch.
    pub fn at(rfc3339: &str) -> Self {
        let instant = DateTime::parse_from_rfc3339(rfc3339)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();
        Self::new(instant)
    }

    pub fn advance_secs(&self, secs: i64) {
        self.unix_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.unix_secs.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}

/// Checkpoint store whose every operation fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn load(&self, _plate: &Plate) -> Result<Option<Checkpoint>, StoreError> {
        Err(StoreError::OperationFailed("disk unavailable".into()))
    }

    async fn save(&self, _checkpoint: &Checkpoint) -> Result<(), StoreError> {
        Err(StoreError::OperationFailed("disk unavailable".into()))
    }

    async fn delete(&self, _plate: &Plate) -> Result<(), StoreError> {
        Err(StoreError::OperationFailed("disk unavailable".into()))
    }

    async fn list_plates(&self) -> Result<Vec<Plate>, StoreError> {
        Err(StoreError::OperationFailed("disk unavailable".into()))
    }
}

/// In-memory checkpoint store that refuses to delete.
///
/// Loads and saves go through to the wrapped store; `delete_calls` counts the
/// refused deletes.
#[derive(Clone, Default)]
pub struct DeleteFailingStore {
    inner: InMemoryCheckpointStore,
    delete_calls: Arc<AtomicUsize>,
}

impl DeleteFailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store underneath, for inspecting what was left behind.
    pub fn inner(&self) -> &InMemoryCheckpointStore {
        &self.inner
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for DeleteFailingStore {
    async fn load(&self, plate: &Plate) -> Result<Option<Checkpoint>, StoreError> {
        self.inner.load(plate).await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.inner.save(checkpoint).await
    }

    async fn delete(&self, _plate: &Plate) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::OperationFailed("unlink refused".into()))
    }

    async fn list_plates(&self) -> Result<Vec<Plate>, StoreError> {
        self.inner.list_plates().await
    }
}
