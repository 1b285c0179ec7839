//! Event loop that drives an active inspection.
//!
//! One event is handled at a time: either the outcome of the outstanding
//! `scan_once`, or the next inspector command. A command that arrives while a
//! scan is outstanding wins the race; the scan request is abandoned and, if
//! the session still wants one, re-issued after the command is applied.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::FareBackend;
use crate::errors::NfcError;
use crate::nfc::{NfcAdapter, ScanOutcome};
use crate::session::{InspectionMachine, SessionEffect, SessionError, SessionStatus};
use crate::store::CheckpointStore;
use crate::types::InspectionRecord;

/// Inspector actions accepted while a session is active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InspectorCommand {
    /// Answer the passenger-type prompt for the scanned tag
    SelectPassengerType(String),
    DismissPrompt,
    AddManual(String),
    DeleteEntry(String),
    ResumeScanning,
    /// Open the platform NFC prompt, then resume scanning if it was enabled
    EnableNfc,
    End,
    Cancel,
}

/// What the driver reports back to the inspector-facing layer.
#[derive(Clone, Debug, PartialEq)]
pub enum DriverEvent {
    Effect(SessionEffect),
    Error(SessionError),
}

/// How `run_session` finished.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    Submitted(InspectionRecord),
    Cancelled,
    /// Command stream closed while Active. The checkpoint is left for restore.
    Abandoned,
}

enum Step {
    Scan(Result<ScanOutcome, NfcError>),
    Command(Option<InspectorCommand>),
}

/// Drive `machine`, which must already be Active, until it ends, is
/// cancelled, or the command stream closes.
pub async fn run_session<S, N, B>(
    machine: &mut InspectionMachine<S, N, B>,
    commands: &mut mpsc::Receiver<InspectorCommand>,
    events: &mpsc::UnboundedSender<DriverEvent>,
) -> Result<SessionOutcome, SessionError>
where
    S: CheckpointStore,
    N: NfcAdapter,
    B: FareBackend,
{
    if machine.status() != SessionStatus::Active {
        return Err(SessionError::InvalidState(
            "cannot drive a session that is not active".into(),
        ));
    }

    let nfc: Arc<N> = machine.nfc().clone();

    loop {
        let scanning = machine.wants_scan();
        let step = if scanning {
            tokio::select! {
                biased;
                scan = nfc.scan_once() => Step::Scan(scan),
                cmd = commands.recv() => Step::Command(cmd),
            }
        } else {
            Step::Command(commands.recv().await)
        };

        let cmd = match step {
            Step::Scan(Ok(ScanOutcome::Tag(tag_id))) => {
                emit(events, machine.on_tag_scanned(&tag_id));
                continue;
            }
            Step::Scan(Ok(ScanOutcome::Cancelled)) => {
                debug!("scan cancelled by adapter, suspending");
                emit(events, machine.suspend_scanning());
                continue;
            }
            Step::Scan(Err(e)) => {
                let _ = events.send(DriverEvent::Error(e.into()));
                emit(events, machine.suspend_scanning());
                continue;
            }
            Step::Command(None) => {
                if scanning {
                    nfc.cancel_scan().await;
                }
                info!("command stream closed, leaving inspection checkpointed");
                return Ok(SessionOutcome::Abandoned);
            }
            Step::Command(Some(cmd)) => cmd,
        };

        // end() and cancel() tell the adapter themselves
        if scanning && !matches!(cmd, InspectorCommand::End | InspectorCommand::Cancel) {
            nfc.cancel_scan().await;
        }

        debug!(command = ?cmd, "inspector command");
        match cmd {
            InspectorCommand::SelectPassengerType(label) => {
                emit(events, machine.select_passenger_type(&label).await);
            }
            InspectorCommand::DismissPrompt => emit(events, machine.dismiss_prompt()),
            InspectorCommand::AddManual(label) => emit(events, machine.add_manual(&label).await),
            InspectorCommand::DeleteEntry(id) => {
                emit(events, machine.delete_log_entry(&id).await);
            }
            InspectorCommand::ResumeScanning => emit(events, machine.resume_scanning()),
            InspectorCommand::EnableNfc => match machine.request_nfc_enable().await {
                Ok(true) => emit(events, machine.resume_scanning()),
                Ok(false) => {
                    let _ = events.send(DriverEvent::Error(SessionError::NfcDisabled));
                }
                Err(e) => {
                    let _ = events.send(DriverEvent::Error(e));
                }
            },
            InspectorCommand::End => {
                emit(events, machine.end().await);
                if let Some(record) = machine.receipt() {
                    return Ok(SessionOutcome::Submitted(record.clone()));
                }
            }
            InspectorCommand::Cancel => {
                emit(events, machine.cancel().await);
                if machine.status() == SessionStatus::Idle {
                    return Ok(SessionOutcome::Cancelled);
                }
            }
        }
    }
}

fn emit(
    events: &mpsc::UnboundedSender<DriverEvent>,
    result: Result<Vec<SessionEffect>, SessionError>,
) {
    match result {
        Ok(effects) => {
            for effect in effects {
                let _ = events.send(DriverEvent::Effect(effect));
            }
        }
        Err(e) => {
            let _ = events.send(DriverEvent::Error(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiError;
    use crate::harness::{MockBackend, ScriptedNfc};
    use crate::store::InMemoryCheckpointStore;
    use crate::types::{Plate, Route};
    use rust_decimal_macros::dec;

    fn route() -> Route {
        Route {
            id: None,
            origin: "Terminal".into(),
            destination: "Campus".into(),
            added_rate: dec!(5.00),
        }
    }

    async fn started(
        nfc: Arc<ScriptedNfc>,
        backend: Arc<MockBackend>,
        store: Arc<InMemoryCheckpointStore>,
    ) -> InspectionMachine<InMemoryCheckpointStore, ScriptedNfc, MockBackend> {
        let mut m = InspectionMachine::new(store, nfc, backend);
        m.start(Plate::new("NAB 1234"), "Juan", route()).await.unwrap();
        m
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DriverEvent>) -> Vec<DriverEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn test_scan_select_end() {
        let nfc = Arc::new(ScriptedNfc::with_tags(["A1"]));
        let backend = Arc::new(MockBackend::with_standard_rates());
        let store = InMemoryCheckpointStore::new_shared();
        let mut m = started(nfc, backend.clone(), store.clone()).await;

        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        cmd_tx
            .send(InspectorCommand::SelectPassengerType("Regular".into()))
            .await
            .unwrap();
        cmd_tx.send(InspectorCommand::End).await.unwrap();

        let outcome = run_session(&mut m, &mut cmd_rx, &ev_tx).await.unwrap();
        let SessionOutcome::Submitted(record) = outcome else {
            panic!("expected a submitted inspection");
        };
        assert_eq!(record.total_claimed_money, dec!(15.00));
        assert_eq!(backend.balance_checks().await.len(), 1);
        assert!(store.is_empty().await);

        let events = drain(&mut ev_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            DriverEvent::Effect(SessionEffect::PromptPassengerType { tag_id, .. }) if tag_id == "A1"
        )));
    }

    #[tokio::test]
    async fn test_cancel_preempts_pending_scan() {
        let nfc = Arc::new(ScriptedNfc::new());
        let store = InMemoryCheckpointStore::new_shared();
        let mut m = started(
            nfc.clone(),
            Arc::new(MockBackend::with_standard_rates()),
            store.clone(),
        )
        .await;

        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();
        cmd_tx.send(InspectorCommand::Cancel).await.unwrap();

        let outcome = run_session(&mut m, &mut cmd_rx, &ev_tx).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cancelled);
        assert!(nfc.cancel_calls() >= 1);
        assert!(nfc.scan_calls() >= 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_nfc_error_suspends_until_resumed() {
        let nfc = Arc::new(ScriptedNfc::new());
        nfc.push(Err(NfcError::Read("tag lost".into()))).await;
        let mut m = started(
            nfc.clone(),
            Arc::new(MockBackend::with_standard_rates()),
            InMemoryCheckpointStore::new_shared(),
        )
        .await;

        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        cmd_tx.send(InspectorCommand::AddManual("Student".into())).await.unwrap();
        drop(cmd_tx);

        let outcome = run_session(&mut m, &mut cmd_rx, &ev_tx).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Abandoned);
        assert!(m.is_scanning_suspended());
        assert_eq!(m.session().unwrap().log.len(), 1);

        let events = drain(&mut ev_rx);
        assert!(events.contains(&DriverEvent::Error(SessionError::NfcRead("tag lost".into()))));
        assert!(events.contains(&DriverEvent::Effect(SessionEffect::ScanningSuspended)));
    }

    #[tokio::test]
    async fn test_failed_submission_keeps_driving() {
        let nfc = Arc::new(ScriptedNfc::new());
        let backend = Arc::new(MockBackend::with_standard_rates());
        backend.fail_submissions(Some(ApiError::Timeout)).await;
        let mut m = started(nfc, backend.clone(), InMemoryCheckpointStore::new_shared()).await;

        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        cmd_tx.send(InspectorCommand::AddManual("Regular".into())).await.unwrap();
        cmd_tx.send(InspectorCommand::End).await.unwrap();
        drop(cmd_tx);

        let outcome = run_session(&mut m, &mut cmd_rx, &ev_tx).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Abandoned);
        assert_eq!(m.status(), SessionStatus::Active);
        assert!(drain(&mut ev_rx)
            .contains(&DriverEvent::Error(SessionError::Network(ApiError::Timeout))));
    }

    #[tokio::test]
    async fn test_requires_active_machine() {
        let mut m = InspectionMachine::new(
            InMemoryCheckpointStore::new_shared(),
            Arc::new(ScriptedNfc::new()),
            Arc::new(MockBackend::with_standard_rates()),
        );
        let (_cmd_tx, mut cmd_rx) = mpsc::channel(1);
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();
        assert!(matches!(
            run_session(&mut m, &mut cmd_rx, &ev_tx).await,
            Err(SessionError::InvalidState(_))
        ));
    }
}
