//! Inspection session state machine.
//!
//! `InspectionMachine` owns the single in-memory `InspectionSession` for a
//! device and moves it through `Idle -> Active -> Ended`. Cancellation
//! discards the session and returns straight to `Idle`.
//!
//! Every transition returns the UI-facing consequences as a list of
//! `SessionEffect`s instead of triggering them. Failures that the inspector
//! must see come back as `SessionError`; checkpoint write failures never do.
//! They are logged and reported as `SessionEffect::PersistenceWarning`.
//!
//! Log mutations write the checkpoint before returning, so a process kill
//! between two operations loses at most the scan in flight.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{BalanceDecision, FareBackend};
use crate::clock::{CivilTime, Clock, SystemClock};
use crate::errors::{ApiError, NfcError};
use crate::fare::{FareError, FareRateCache};
use crate::nfc::NfcAdapter;
use crate::store::{Checkpoint, CheckpointStore, Closure, StoreError};
use crate::types::{
    new_entry_id, InspectionRecord, PassengerType, Plate, Route, RouteSnapshot, ScanLogEntry,
    SubmittedLogEntry,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced to the inspector-facing layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// Operation not valid in the current status
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Device has no NFC hardware
    #[error("NFC is not supported on this device")]
    NfcUnavailable,

    /// NFC must be switched on before a session can start
    #[error("NFC is disabled")]
    NfcDisabled,

    #[error("NFC read failed: {0}")]
    NfcRead(String),

    /// Card cannot cover the cumulative fare; the scan was discarded
    #[error("insufficient balance for {tag_id} ({fare}): {message}")]
    BalanceDenied {
        tag_id: String,
        fare: Decimal,
        message: String,
    },

    /// Balance check, fare-rate fetch, or submission failed in transit
    #[error("network error: {0}")]
    Network(ApiError),

    #[error(transparent)]
    Fare(#[from] FareError),

    /// A checkpoint exists for this plate; restore it instead of starting over
    #[error("an unfinished inspection exists for {plate}")]
    PendingCheckpoint { plate: Plate },

    /// Passenger type selected with no scanned tag waiting
    #[error("no scanned tag is awaiting a passenger type")]
    NoPendingScan,

    #[error("log entry not found: {0}")]
    EntryNotFound(String),

    /// Reading a checkpoint failed
    #[error("checkpoint store error: {0}")]
    Persistence(StoreError),
}

impl SessionError {
    /// Message suitable for showing to the inspector.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::NfcUnavailable => "This device does not support NFC.".into(),
            SessionError::NfcDisabled => {
                "NFC is turned off. Enable NFC and start the inspection again.".into()
            }
            SessionError::NfcRead(_) => "Could not read the card. Tap it again.".into(),
            SessionError::BalanceDenied { fare, message, .. } => {
                format!("Insufficient balance for PHP {:.2}: {}", fare, message)
            }
            SessionError::Network(ApiError::Timeout) => {
                "The server did not respond in time. Try again.".into()
            }
            SessionError::Network(ApiError::Unauthorized(_)) => {
                "Your login has expired. Sign in again.".into()
            }
            SessionError::Network(e) => format!("Network problem: {}. Try again.", e),
            SessionError::PendingCheckpoint { plate } => format!(
                "An unfinished inspection for {} was found. Resume or discard it first.",
                plate
            ),
            other => other.to_string(),
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Network(e) => e.is_retryable(),
            SessionError::NfcDisabled | SessionError::NfcRead(_) => true,
            _ => false,
        }
    }
}

impl From<NfcError> for SessionError {
    fn from(e: NfcError) -> Self {
        match e {
            NfcError::Unavailable => SessionError::NfcUnavailable,
            NfcError::Disabled => SessionError::NfcDisabled,
            NfcError::Read(msg) => SessionError::NfcRead(msg),
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(e: ApiError) -> Self {
        SessionError::Network(e)
    }
}

// ============================================================================
// Session State
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Active,
    /// Submitted; the receipt stays available until `reset` or the next start
    Ended,
}

/// The in-progress inspection. `start_time` exists exactly while Active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InspectionSession {
    pub plate: Plate,
    pub driver: String,
    pub route: Route,
    pub start_time: CivilTime,
    pub log: Vec<ScanLogEntry>,
}

struct ActiveInspection {
    session: InspectionSession,
    fares: FareRateCache,
    /// Tag scanned and waiting for the inspector to pick a passenger type
    pending_tag: Option<String>,
    scanning_suspended: bool,
}

impl ActiveInspection {
    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            plate: self.session.plate.clone(),
            driver: self.session.driver.clone(),
            route: self.session.route.clone(),
            rates: self.fares.passenger_types().to_vec(),
            start_time: self.session.start_time,
            log: self.session.log.clone(),
            closed: None,
        }
    }

    fn running_total(&self) -> Result<Decimal, FareError> {
        self.fares.total(&self.session.log)
    }

    fn build_record(&self, end_time: CivilTime, inspector: &str) -> Result<InspectionRecord, FareError> {
        let session = &self.session;
        let logs = session
            .log
            .iter()
            .map(|entry| {
                Ok(SubmittedLogEntry {
                    fare: self.fares.entry_fare(entry)?,
                    entry: entry.clone(),
                    plate: session.plate.clone(),
                })
            })
            .collect::<Result<Vec<_>, FareError>>()?;

        Ok(InspectionRecord {
            inspection_id: None,
            driver: session.driver.clone(),
            plate: session.plate.clone(),
            route: RouteSnapshot::from(&session.route),
            start_time: session.start_time,
            end_time,
            total_passengers: session.log.len(),
            total_claimed_money: self.running_total()?,
            logs,
            passenger_counts: FareRateCache::passenger_counts(&session.log),
            inspector: inspector.to_string(),
            current_fare_rates: self.fares.passenger_types().to_vec(),
        })
    }
}

enum MachineState {
    Idle,
    Active(ActiveInspection),
    Ended(InspectionRecord),
}

/// Consequences of a transition for the inspector-facing layer.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEffect {
    Started {
        plate: Plate,
        start_time: CivilTime,
    },
    Restored {
        plate: Plate,
        start_time: CivilTime,
        entries: usize,
    },
    /// Issue the next `scan_once`
    ArmScan,
    /// Ask the inspector which passenger type the scanned card is paying for
    PromptPassengerType {
        tag_id: String,
        options: Vec<PassengerType>,
    },
    EntryLogged {
        entry: ScanLogEntry,
        fare: Decimal,
        running_total: Decimal,
    },
    EntryRemoved {
        entry: ScanLogEntry,
        running_total: Decimal,
    },
    ScanningSuspended,
    /// Checkpoint write failed; the operation itself succeeded
    PersistenceWarning(String),
    /// Final record with the server-assigned inspection id
    Submitted(InspectionRecord),
    Cancelled {
        plate: Plate,
        discarded: usize,
    },
}

// ============================================================================
// Inspection Machine
// ============================================================================

/// Deletes tried before a finished session's checkpoint is marked closed.
const DELETE_ATTEMPTS: u32 = 2;

pub struct InspectionMachine<S: CheckpointStore, N: NfcAdapter, B: FareBackend> {
    store: Arc<S>,
    nfc: Arc<N>,
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    inspector: String,
    state: MachineState,
}

impl<S: CheckpointStore, N: NfcAdapter, B: FareBackend> InspectionMachine<S, N, B> {
    pub fn new(store: Arc<S>, nfc: Arc<N>, backend: Arc<B>) -> Self {
        Self {
            store,
            nfc,
            backend,
            clock: Arc::new(SystemClock),
            inspector: String::new(),
            state: MachineState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Name recorded as the inspector on submitted records.
    pub fn with_inspector(mut self, inspector: impl Into<String>) -> Self {
        self.inspector = inspector.into();
        self
    }

    pub fn nfc(&self) -> &Arc<N> {
        &self.nfc
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn status(&self) -> SessionStatus {
        match self.state {
            MachineState::Idle => SessionStatus::Idle,
            MachineState::Active(_) => SessionStatus::Active,
            MachineState::Ended(_) => SessionStatus::Ended,
        }
    }

    pub fn session(&self) -> Option<&InspectionSession> {
        match &self.state {
            MachineState::Active(active) => Some(&active.session),
            _ => None,
        }
    }

    /// Record of the last successful submission, while Ended.
    pub fn receipt(&self) -> Option<&InspectionRecord> {
        match &self.state {
            MachineState::Ended(record) => Some(record),
            _ => None,
        }
    }

    pub fn passenger_types(&self) -> &[PassengerType] {
        match &self.state {
            MachineState::Active(active) => active.fares.passenger_types(),
            _ => &[],
        }
    }

    pub fn pending_tag(&self) -> Option<&str> {
        match &self.state {
            MachineState::Active(active) => active.pending_tag.as_deref(),
            _ => None,
        }
    }

    /// Whether the driver should have a `scan_once` outstanding.
    pub fn wants_scan(&self) -> bool {
        match &self.state {
            MachineState::Active(active) => {
                active.pending_tag.is_none() && !active.scanning_suspended
            }
            _ => false,
        }
    }

    pub fn is_scanning_suspended(&self) -> bool {
        matches!(&self.state, MachineState::Active(a) if a.scanning_suspended)
    }

    /// Sum of fares over the current log. Zero outside an active session.
    pub fn running_total(&self) -> Result<Decimal, SessionError> {
        match &self.state {
            MachineState::Active(active) => Ok(active.running_total()?),
            _ => Ok(Decimal::ZERO),
        }
    }

    pub fn passenger_counts(&self) -> BTreeMap<String, usize> {
        match &self.state {
            MachineState::Active(active) => FareRateCache::passenger_counts(&active.session.log),
            _ => BTreeMap::new(),
        }
    }

    /// Log in display order, most recent first.
    pub fn entries_newest_first(&self) -> Vec<&ScanLogEntry> {
        match &self.state {
            MachineState::Active(active) => active.session.log.iter().rev().collect(),
            _ => Vec::new(),
        }
    }

    pub fn fare_of(&self, entry: &ScanLogEntry) -> Result<Decimal, SessionError> {
        let active = self.active("compute a fare")?;
        Ok(active.fares.entry_fare(entry)?)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start a new inspection for `plate`.
    ///
    /// Fails with `NfcUnavailable`/`NfcDisabled` before touching anything, and
    /// with `PendingCheckpoint` if an unfinished inspection for the plate is
    /// on disk. A fare-rate fetch failure leaves the machine Idle.
    pub async fn start(
        &mut self,
        plate: Plate,
        driver: impl Into<String>,
        route: Route,
    ) -> Result<Vec<SessionEffect>, SessionError> {
        if let MachineState::Active(active) = &self.state {
            return Err(SessionError::InvalidState(format!(
                "inspection for {} already active",
                active.session.plate
            )));
        }
        let driver = driver.into();
        if plate.is_empty() {
            return Err(SessionError::InvalidInput("plate is empty".into()));
        }
        if driver.trim().is_empty() {
            return Err(SessionError::InvalidInput("driver is empty".into()));
        }

        if !self.nfc.is_available().await {
            return Err(SessionError::NfcUnavailable);
        }
        if !self.nfc.is_enabled().await {
            return Err(SessionError::NfcDisabled);
        }

        match self.store.load(&plate).await {
            Ok(Some(cp)) if cp.is_closed() => self.drop_closed(&plate).await,
            Ok(Some(_)) => return Err(SessionError::PendingCheckpoint { plate }),
            Ok(None) => {}
            Err(e) => warn!(plate = %plate, error = %e, "could not check for existing checkpoint"),
        }

        let rates = self.backend.fetch_fare_rates().await?;
        let fares = FareRateCache::new(route.added_rate, rates)?;
        let start_time = CivilTime::now(self.clock.as_ref());

        info!(plate = %plate, driver = %driver, start_time = %start_time, "inspection started");

        self.state = MachineState::Active(ActiveInspection {
            session: InspectionSession {
                plate: plate.clone(),
                driver,
                route,
                start_time,
                log: Vec::new(),
            },
            fares,
            pending_tag: None,
            scanning_suspended: false,
        });

        let mut effects = vec![SessionEffect::Started { plate, start_time }];
        self.persist(&mut effects).await;
        self.rearm(&mut effects);
        Ok(effects)
    }

    /// Resume the checkpointed inspection for `plate` after a restart.
    ///
    /// Returns `Ok(None)` when there is nothing to restore. The fare cache is
    /// rebuilt from the rates stored in the checkpoint.
    pub async fn restore(&mut self, plate: &Plate) -> Result<Option<Vec<SessionEffect>>, SessionError> {
        if let MachineState::Active(active) = &self.state {
            return Err(SessionError::InvalidState(format!(
                "inspection for {} already active",
                active.session.plate
            )));
        }

        let Some(checkpoint) = self.store.load(plate).await.map_err(SessionError::Persistence)?
        else {
            debug!(plate = %plate, "no checkpoint to restore");
            return Ok(None);
        };
        if checkpoint.is_closed() {
            self.drop_closed(plate).await;
            return Ok(None);
        }

        let fares = FareRateCache::new(checkpoint.route.added_rate, checkpoint.rates)?;
        for entry in &checkpoint.log {
            fares.entry_fare(entry)?;
        }

        let entries = checkpoint.log.len();
        let start_time = checkpoint.start_time;
        info!(plate = %plate, entries, start_time = %start_time, "inspection restored");

        self.state = MachineState::Active(ActiveInspection {
            session: InspectionSession {
                plate: checkpoint.plate,
                driver: checkpoint.driver,
                route: checkpoint.route,
                start_time,
                log: checkpoint.log,
            },
            fares,
            pending_tag: None,
            scanning_suspended: false,
        });

        let mut effects = vec![SessionEffect::Restored {
            plate: plate.clone(),
            start_time,
            entries,
        }];
        self.rearm(&mut effects);
        Ok(Some(effects))
    }

    /// Stop scanning, submit the record, and clear the checkpoint.
    ///
    /// On submission failure the session stays Active with its log and any
    /// open passenger-type prompt intact.
    pub async fn end(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        let end_time = CivilTime::now(self.clock.as_ref());
        let inspector = self.inspector.clone();
        let record = self.active("end")?.build_record(end_time, &inspector)?;

        self.nfc.cancel_scan().await;

        let receipt = match self.backend.submit_inspection(&record).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(plate = %record.plate, error = %e, "inspection submission failed");
                return Err(SessionError::Network(e));
            }
        };

        let mut record = record;
        record.inspection_id = Some(receipt.inspection_id.clone());
        info!(
            plate = %record.plate,
            inspection_id = record.inspection_id.as_deref().unwrap_or_default(),
            total = %record.total_claimed_money,
            passengers = record.total_passengers,
            "inspection submitted"
        );

        let mut effects = Vec::new();
        let closure = Closure::Submitted {
            inspection_id: receipt.inspection_id,
        };
        self.close_checkpoint(closure, &mut effects).await;
        self.state = MachineState::Ended(record.clone());
        effects.push(SessionEffect::Submitted(record));
        Ok(effects)
    }

    /// Discard the session without contacting the server.
    pub async fn cancel(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        let (plate, discarded) = {
            let active = self.active("cancel")?;
            (active.session.plate.clone(), active.session.log.len())
        };

        self.nfc.cancel_scan().await;

        let mut effects = Vec::new();
        self.close_checkpoint(Closure::Cancelled, &mut effects).await;
        self.state = MachineState::Idle;
        info!(plate = %plate, discarded, "inspection cancelled");

        effects.push(SessionEffect::Cancelled { plate, discarded });
        Ok(effects)
    }

    /// Drop the receipt of an ended session.
    pub fn reset(&mut self) {
        if !matches!(self.state, MachineState::Active(_)) {
            self.state = MachineState::Idle;
        }
    }

    // -------------------------------------------------------------------------
    // Log Operations
    // -------------------------------------------------------------------------

    /// A card was read. Holds the tag until a passenger type is chosen.
    pub fn on_tag_scanned(&mut self, tag_id: &str) -> Result<Vec<SessionEffect>, SessionError> {
        let tag_id = tag_id.trim();
        if tag_id.is_empty() {
            return Err(SessionError::InvalidInput("tag id is empty".into()));
        }
        let active = self.active_mut("accept a scan")?;
        if let Some(pending) = &active.pending_tag {
            return Err(SessionError::InvalidState(format!(
                "tag {} is still awaiting a passenger type",
                pending
            )));
        }

        debug!(plate = %active.session.plate, tag_id, "tag scanned");
        active.pending_tag = Some(tag_id.to_string());
        Ok(vec![SessionEffect::PromptPassengerType {
            tag_id: tag_id.to_string(),
            options: active.fares.passenger_types().to_vec(),
        }])
    }

    /// Charge the pending tag for one passenger of type `label`.
    ///
    /// The balance oracle sees the cumulative fare for the tag in this session,
    /// including this passenger. Denial and network failure both discard the
    /// scan and leave the log unchanged. An unknown type keeps the tag pending.
    pub async fn select_passenger_type(&mut self, label: &str) -> Result<Vec<SessionEffect>, SessionError> {
        let (tag_id, cumulative) = {
            let active = self.active_mut("select a passenger type")?;
            let tag_id = active.pending_tag.clone().ok_or(SessionError::NoPendingScan)?;
            let cumulative = active
                .fares
                .accumulated_for_tag(&active.session.log, &tag_id, label)?;
            active.pending_tag = None;
            (tag_id, cumulative)
        };

        match self.backend.check_balance(&tag_id, cumulative).await {
            Ok(BalanceDecision::Approved) => {
                debug!(tag_id = %tag_id, fare = %cumulative, "balance approved");
            }
            Ok(BalanceDecision::Denied { message }) => {
                warn!(tag_id = %tag_id, fare = %cumulative, message = %message, "balance denied");
                return Err(SessionError::BalanceDenied {
                    tag_id,
                    fare: cumulative,
                    message,
                });
            }
            Err(e) => {
                warn!(tag_id = %tag_id, error = %e, "balance check failed, scan discarded");
                return Err(SessionError::Network(e));
            }
        }

        self.append(label, Some(tag_id)).await
    }

    /// Inspector declined to pick a type; discard the scan.
    pub fn dismiss_prompt(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        let active = self.active_mut("dismiss a prompt")?;
        if let Some(tag_id) = active.pending_tag.take() {
            debug!(tag_id = %tag_id, "scan dismissed");
        }
        let mut effects = Vec::new();
        self.rearm(&mut effects);
        Ok(effects)
    }

    /// Record a passenger with no card.
    ///
    /// No balance check is made for manual entries. Such passengers are
    /// counted and charged in the totals but never verified against a card.
    pub async fn add_manual(&mut self, label: &str) -> Result<Vec<SessionEffect>, SessionError> {
        self.active("add a passenger")?.fares.fare_for(label)?;
        self.append(label, None).await
    }

    pub async fn delete_log_entry(&mut self, id: &str) -> Result<Vec<SessionEffect>, SessionError> {
        let (entry, running_total) = {
            let active = self.active_mut("delete an entry")?;
            let pos = active
                .session
                .log
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| SessionError::EntryNotFound(id.to_string()))?;
            let entry = active.session.log.remove(pos);
            (entry, active.running_total()?)
        };
        debug!(entry_id = %entry.id, running_total = %running_total, "log entry deleted");

        let mut effects = Vec::new();
        self.persist(&mut effects).await;
        effects.push(SessionEffect::EntryRemoved {
            entry,
            running_total,
        });
        self.rearm(&mut effects);
        Ok(effects)
    }

    // -------------------------------------------------------------------------
    // Scanning Control
    // -------------------------------------------------------------------------

    /// Stop re-arming scans until `resume_scanning`.
    pub fn suspend_scanning(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        let active = self.active_mut("suspend scanning")?;
        active.scanning_suspended = true;
        Ok(vec![SessionEffect::ScanningSuspended])
    }

    pub fn resume_scanning(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        let active = self.active_mut("resume scanning")?;
        active.scanning_suspended = false;
        let mut effects = Vec::new();
        self.rearm(&mut effects);
        Ok(effects)
    }

    /// Route the inspector through the platform's NFC enable prompt.
    pub async fn request_nfc_enable(&self) -> Result<bool, SessionError> {
        if !self.nfc.is_available().await {
            return Err(SessionError::NfcUnavailable);
        }
        Ok(self.nfc.request_enable().await?)
    }

    // -------------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------------

    fn active(&self, action: &str) -> Result<&ActiveInspection, SessionError> {
        match &self.state {
            MachineState::Active(active) => Ok(active),
            _ => Err(SessionError::InvalidState(format!(
                "cannot {}: no active inspection",
                action
            ))),
        }
    }

    fn active_mut(&mut self, action: &str) -> Result<&mut ActiveInspection, SessionError> {
        match &mut self.state {
            MachineState::Active(active) => Ok(active),
            _ => Err(SessionError::InvalidState(format!(
                "cannot {}: no active inspection",
                action
            ))),
        }
    }

    async fn append(
        &mut self,
        label: &str,
        tag_id: Option<String>,
    ) -> Result<Vec<SessionEffect>, SessionError> {
        let timestamp = CivilTime::now(self.clock.as_ref());
        let (entry, fare, running_total) = {
            let active = self.active_mut("log a passenger")?;
            let entry = ScanLogEntry {
                id: new_entry_id(),
                timestamp,
                passenger_type: label.to_string(),
                tag_id,
            };
            let fare = active.fares.entry_fare(&entry)?;
            active.session.log.push(entry.clone());
            (entry, fare, active.running_total()?)
        };
        debug!(
            entry_id = %entry.id,
            passenger_type = %entry.passenger_type,
            manual = entry.is_manual(),
            fare = %fare,
            running_total = %running_total,
            "passenger logged"
        );

        let mut effects = Vec::new();
        self.persist(&mut effects).await;
        effects.push(SessionEffect::EntryLogged {
            entry,
            fare,
            running_total,
        });
        self.rearm(&mut effects);
        Ok(effects)
    }

    async fn persist(&self, effects: &mut Vec<SessionEffect>) {
        let MachineState::Active(active) = &self.state else {
            return;
        };
        let checkpoint = active.checkpoint();
        if let Err(e) = self.store.save(&checkpoint).await {
            warn!(plate = %checkpoint.plate, error = %e, "checkpoint write failed");
            effects.push(SessionEffect::PersistenceWarning(e.to_string()));
        }
    }

    /// Delete the checkpoint of the session that is leaving Active.
    ///
    /// When every delete attempt fails the checkpoint is overwritten with a
    /// closed marker, which `restore` and `start` clear instead of reviving.
    async fn close_checkpoint(&self, closure: Closure, effects: &mut Vec<SessionEffect>) {
        let MachineState::Active(active) = &self.state else {
            return;
        };
        let plate = &active.session.plate;

        for attempt in 1..=DELETE_ATTEMPTS {
            match self.store.delete(plate).await {
                Ok(()) => return,
                Err(e) => warn!(plate = %plate, attempt, error = %e, "checkpoint delete failed"),
            }
        }

        let mut tombstone = active.checkpoint();
        tombstone.closed = Some(closure);
        match self.store.save(&tombstone).await {
            Ok(()) => info!(plate = %plate, "checkpoint marked closed"),
            Err(e) => {
                warn!(plate = %plate, error = %e, "could not mark checkpoint closed");
                effects.push(SessionEffect::PersistenceWarning(e.to_string()));
            }
        }
    }

    async fn drop_closed(&self, plate: &Plate) {
        debug!(plate = %plate, "clearing closed checkpoint");
        if let Err(e) = self.store.delete(plate).await {
            warn!(plate = %plate, error = %e, "closed checkpoint left in store");
        }
    }

    fn rearm(&self, effects: &mut Vec<SessionEffect>) {
        if self.wants_scan() {
            effects.push(SessionEffect::ArmScan);
        }
    }
}
