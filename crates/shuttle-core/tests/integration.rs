//! Integration tests for inspection sessions.
//!
//! These tests drive `InspectionMachine` through whole sessions with the
//! harness doubles and check the money and recovery guarantees:
//! - submitted totals equal the running total
//! - denied or failed balance checks never log a passenger
//! - checkpoints reproduce the session after a simulated kill
//! - manual passengers never reach the balance oracle
//! - a finished session never comes back, even when its checkpoint sticks

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use shuttle_core::{
    errors::ApiError,
    harness::{DeleteFailingStore, FixedClock, MockBackend, ScriptedNfc},
    session::{InspectionMachine, SessionEffect, SessionError, SessionStatus},
    store::{CheckpointStore, Closure, InMemoryCheckpointStore},
    types::{Plate, Route},
};

type Machine = InspectionMachine<InMemoryCheckpointStore, ScriptedNfc, MockBackend>;

fn route() -> Route {
    Route {
        id: Some(7),
        origin: "Bus Terminal".into(),
        destination: "University".into(),
        added_rate: dec!(5.00),
    }
}

fn plate() -> Plate {
    Plate::new("NAB 1234")
}

fn machine_with(store: Arc<InMemoryCheckpointStore>, backend: Arc<MockBackend>) -> Machine {
    InspectionMachine::new(store, Arc::new(ScriptedNfc::new()), backend)
        .with_clock(Arc::new(FixedClock::at("2024-05-01T23:30:00Z")))
        .with_inspector("Ana Reyes")
}

async fn started() -> (Machine, Arc<InMemoryCheckpointStore>, Arc<MockBackend>) {
    let store = InMemoryCheckpointStore::new_shared();
    let backend = Arc::new(MockBackend::with_standard_rates());
    let mut m = machine_with(store.clone(), backend.clone());
    m.start(plate(), "Juan Cruz", route()).await.unwrap();
    (m, store, backend)
}

async fn scan(m: &mut Machine, tag: &str, label: &str) -> Result<Vec<SessionEffect>, SessionError> {
    m.on_tag_scanned(tag)?;
    m.select_passenger_type(label).await
}

fn submitted(effects: &[SessionEffect]) -> shuttle_core::types::InspectionRecord {
    effects
        .iter()
        .find_map(|e| match e {
            SessionEffect::Submitted(record) => Some(record.clone()),
            _ => None,
        })
        .unwrap()
}

/// Test: a repeat scan is checked against the cumulative fare; denial keeps the log
#[tokio::test]
async fn integration_repeat_scan_denied() {
    let (mut m, _, backend) = started().await;
    backend.set_balance("A1", dec!(20.00)).await;

    scan(&mut m, "A1", "Regular").await.unwrap();
    assert_eq!(m.running_total().unwrap(), dec!(15.00));

    let err = scan(&mut m, "A1", "Regular").await.unwrap_err();
    assert!(matches!(err, SessionError::BalanceDenied { ref fare, .. } if *fare == dec!(30.00)));

    assert_eq!(
        backend.balance_checks().await,
        vec![("A1".to_string(), dec!(15.00)), ("A1".to_string(), dec!(30.00))]
    );
    assert_eq!(m.session().unwrap().log.len(), 1);
    assert_eq!(m.running_total().unwrap(), dec!(15.00));
    assert_eq!(m.status(), SessionStatus::Active);
    assert!(m.wants_scan());
}

/// Test: a repeat scan with enough balance logs a second entry for the same tag
#[tokio::test]
async fn integration_repeat_scan_approved() {
    let (mut m, _, backend) = started().await;
    backend.set_balance("A1", dec!(100.00)).await;

    scan(&mut m, "A1", "Regular").await.unwrap();
    let effects = scan(&mut m, "A1", "Regular").await.unwrap();

    assert!(effects.iter().any(|e| matches!(
        e,
        SessionEffect::EntryLogged { running_total, .. } if *running_total == dec!(30.00)
    )));
    assert_eq!(backend.balance_checks().await[1], ("A1".to_string(), dec!(30.00)));
    assert_eq!(m.session().unwrap().log.len(), 2);
    assert_eq!(m.running_total().unwrap(), dec!(30.00));
}

/// Test: other tags do not count toward a card's cumulative fare
#[tokio::test]
async fn integration_cumulative_fare_is_per_tag() {
    let (mut m, _, backend) = started().await;
    scan(&mut m, "A1", "Regular").await.unwrap();
    scan(&mut m, "B2", "Student").await.unwrap();
    m.add_manual("Regular").await.unwrap();
    scan(&mut m, "B2", "Regular").await.unwrap();

    assert_eq!(
        backend.balance_checks().await,
        vec![
            ("A1".to_string(), dec!(15.00)),
            ("B2".to_string(), dec!(13.00)),
            ("B2".to_string(), dec!(28.00)),
        ]
    );
}

/// Test: three manual students total 39.00 and are never balance-checked
#[tokio::test]
async fn integration_manual_students() {
    let (mut m, store, backend) = started().await;
    for _ in 0..3 {
        m.add_manual("Student").await.unwrap();
    }

    let effects = m.end().await.unwrap();
    let record = submitted(&effects);

    assert_eq!(record.total_claimed_money, dec!(39.00));
    assert_eq!(record.total_passengers, 3);
    assert_eq!(record.passenger_counts, BTreeMap::from([("Student".to_string(), 3)]));
    assert!(record.logs.iter().all(|l| l.entry.tag_id.is_none() && l.fare == dec!(13.00)));
    assert!(backend.balance_checks().await.is_empty());
    assert_eq!(backend.submissions().await.len(), 1);
    assert_eq!(m.status(), SessionStatus::Ended);
    assert!(store.load(&plate()).await.unwrap().is_none());
}

/// Test: a deleted entry is excluded from totals and counts
#[tokio::test]
async fn integration_delete_then_end() {
    let (mut m, store, _) = started().await;
    scan(&mut m, "A1", "Regular").await.unwrap();
    m.add_manual("Student").await.unwrap();
    m.add_manual("Student").await.unwrap();

    let doomed = m.session().unwrap().log[0].id.clone();
    let effects = m.delete_log_entry(&doomed).await.unwrap();
    assert!(effects.iter().any(|e| matches!(
        e,
        SessionEffect::EntryRemoved { running_total, .. } if *running_total == dec!(26.00)
    )));
    assert_eq!(store.load(&plate()).await.unwrap().unwrap().log.len(), 2);

    let record = submitted(&m.end().await.unwrap());
    assert_eq!(record.total_claimed_money, dec!(26.00));
    assert_eq!(record.passenger_counts.get("Regular"), None);
    assert_eq!(record.passenger_counts.get("Student"), Some(&2));
    assert!(record.logs.iter().all(|l| l.entry.id != doomed));
}

/// Test: restore after a simulated kill reproduces log and start time
#[tokio::test]
async fn integration_restore_after_kill() {
    let (mut m, store, backend) = started().await;
    scan(&mut m, "A1", "Regular").await.unwrap();
    m.add_manual("Student").await.unwrap();
    let before = m.session().unwrap().clone();
    let total_before = m.running_total().unwrap();
    drop(m);

    // New process: the backend's rate table changed meanwhile
    let mut revived = machine_with(
        store.clone(),
        Arc::new(MockBackend::new(vec![shuttle_core::types::PassengerType::new(
            "Regular",
            dec!(99.00),
        )])),
    );
    let effects = revived.restore(&plate()).await.unwrap().unwrap();

    assert!(effects.contains(&SessionEffect::ArmScan));
    assert_eq!(revived.status(), SessionStatus::Active);
    assert_eq!(revived.session().unwrap(), &before);
    assert_eq!(revived.running_total().unwrap(), total_before);

    // and the restored session submits with the original rates
    let record = submitted(&revived.end().await.unwrap());
    assert_eq!(record.total_claimed_money, dec!(28.00));
    assert_eq!(record.start_time, before.start_time);
    assert!(backend.submissions().await.is_empty());
}

/// Test: restore with no checkpoint is a no-op
#[tokio::test]
async fn integration_restore_nothing() {
    let store = InMemoryCheckpointStore::new_shared();
    let mut m = machine_with(store, Arc::new(MockBackend::with_standard_rates()));
    assert!(m.restore(&plate()).await.unwrap().is_none());
    assert_eq!(m.status(), SessionStatus::Idle);
}

/// Test: cancel clears the checkpoint and the next start begins empty
#[tokio::test]
async fn integration_cancel_then_start() {
    let (mut m, store, backend) = started().await;
    m.add_manual("Regular").await.unwrap();
    scan(&mut m, "A1", "Student").await.unwrap();

    let effects = m.cancel().await.unwrap();
    assert!(effects.contains(&SessionEffect::Cancelled {
        plate: plate(),
        discarded: 2
    }));
    assert_eq!(m.status(), SessionStatus::Idle);
    assert!(store.load(&plate()).await.unwrap().is_none());
    assert!(backend.submissions().await.is_empty());

    m.start(plate(), "Juan Cruz", route()).await.unwrap();
    assert!(m.session().unwrap().log.is_empty());
    assert_eq!(m.running_total().unwrap(), Decimal::ZERO);
}

/// Test: failed submission keeps the session active and retry succeeds
#[tokio::test]
async fn integration_submission_retry() {
    let (mut m, store, backend) = started().await;
    m.add_manual("Regular").await.unwrap();
    backend
        .fail_submissions(Some(ApiError::Server {
            status: 502,
            message: "bad gateway".into(),
        }))
        .await;

    let err = m.end().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(m.status(), SessionStatus::Active);
    assert_eq!(m.session().unwrap().log.len(), 1);
    assert!(store.load(&plate()).await.unwrap().is_some());

    backend.fail_submissions(None).await;
    let record = submitted(&m.end().await.unwrap());
    assert_eq!(record.total_claimed_money, dec!(15.00));
    assert!(store.load(&plate()).await.unwrap().is_none());
}

/// Test: a failed fare-rate fetch leaves the machine idle with no checkpoint
#[tokio::test]
async fn integration_start_network_failure() {
    let store = InMemoryCheckpointStore::new_shared();
    let backend = Arc::new(MockBackend::with_standard_rates());
    backend.fail_fare_rates(Some(ApiError::Timeout)).await;
    let mut m = machine_with(store.clone(), backend);

    let err = m.start(plate(), "Juan Cruz", route()).await.unwrap_err();
    assert_eq!(err, SessionError::Network(ApiError::Timeout));
    assert_eq!(m.status(), SessionStatus::Idle);
    assert!(store.is_empty().await);
}

type StickyMachine = InspectionMachine<DeleteFailingStore, ScriptedNfc, MockBackend>;

fn sticky_machine(store: Arc<DeleteFailingStore>, backend: Arc<MockBackend>) -> StickyMachine {
    InspectionMachine::new(store, Arc::new(ScriptedNfc::new()), backend)
        .with_clock(Arc::new(FixedClock::at("2024-05-01T23:30:00Z")))
}

fn has_warning(effects: &[SessionEffect]) -> bool {
    effects
        .iter()
        .any(|e| matches!(e, SessionEffect::PersistenceWarning(_)))
}

/// Test: a submitted session whose checkpoint cannot be deleted is not submitted twice
#[tokio::test]
async fn integration_end_with_undeletable_checkpoint() {
    let store = Arc::new(DeleteFailingStore::new());
    let backend = Arc::new(MockBackend::with_standard_rates());
    let mut m = sticky_machine(store.clone(), backend.clone());
    m.start(plate(), "Juan Cruz", route()).await.unwrap();
    m.add_manual("Regular").await.unwrap();

    let effects = m.end().await.unwrap();
    let record = submitted(&effects);
    assert!(!has_warning(&effects));
    assert!(store.delete_calls() >= 2);

    let left = store.inner().load(&plate()).await.unwrap().unwrap();
    assert_eq!(
        left.closed,
        Some(Closure::Submitted {
            inspection_id: record.inspection_id.clone().unwrap()
        })
    );

    // the next process finds nothing to resume
    let mut fresh = sticky_machine(store.clone(), backend.clone());
    assert!(fresh.restore(&plate()).await.unwrap().is_none());
    assert_eq!(fresh.status(), SessionStatus::Idle);
    assert!(matches!(fresh.end().await, Err(SessionError::InvalidState(_))));
    assert_eq!(backend.submissions().await.len(), 1);
}

/// Test: a cancelled session whose checkpoint cannot be deleted stays cancelled
#[tokio::test]
async fn integration_cancel_with_undeletable_checkpoint() {
    let store = Arc::new(DeleteFailingStore::new());
    let backend = Arc::new(MockBackend::with_standard_rates());
    let mut m = sticky_machine(store.clone(), backend.clone());
    m.start(plate(), "Juan Cruz", route()).await.unwrap();
    m.add_manual("Student").await.unwrap();
    m.add_manual("Regular").await.unwrap();

    let effects = m.cancel().await.unwrap();
    assert!(!has_warning(&effects));
    assert_eq!(m.status(), SessionStatus::Idle);

    let left = store.inner().load(&plate()).await.unwrap().unwrap();
    assert_eq!(left.closed, Some(Closure::Cancelled));

    let mut fresh = sticky_machine(store.clone(), backend.clone());
    assert!(fresh.restore(&plate()).await.unwrap().is_none());

    // a new inspection of the same shuttle starts empty
    fresh.start(plate(), "Juan Cruz", route()).await.unwrap();
    assert!(fresh.session().unwrap().log.is_empty());
    let cp = store.inner().load(&plate()).await.unwrap().unwrap();
    assert!(!cp.is_closed());
    assert!(cp.log.is_empty());
    assert!(backend.submissions().await.is_empty());
}

/// Test: timestamps are UTC+8 civil strings
#[tokio::test]
async fn integration_civil_timestamps() {
    let (mut m, _, _) = started().await;
    m.add_manual("Regular").await.unwrap();
    let record = submitted(&m.end().await.unwrap());

    // 23:30 UTC is 07:30 the next day in UTC+8
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["start_datetime"], "2024-05-02 07:30:00");
    assert_eq!(json["end_datetime"], "2024-05-02 07:30:00");
    assert_eq!(json["logs"][0]["timestamp"], "2024-05-02 07:30:00");
    assert_eq!(json["passengerCounts"]["Regular"], 1);
}

#[derive(Clone, Debug)]
enum Op {
    Scan { tag: u8, student: bool },
    Manual { student: bool },
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, any::<bool>()).prop_map(|(tag, student)| Op::Scan { tag, student }),
        any::<bool>().prop_map(|student| Op::Manual { student }),
        (0usize..16).prop_map(Op::Delete),
    ]
}

// For any sequence of scans, manual adds, denials, and deletions, the
// submitted total equals both the last running total and the sum of the
// per-entry fares, and the counts add up to the number of passengers.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_submitted_total_matches_running_total(
        ops in prop::collection::vec(op_strategy(), 0..24),
        limit in 0i64..80,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (mut m, _, backend) = started().await;
            // tag 0 has a small balance so some scans are denied
            backend.set_balance("T0", Decimal::from(limit)).await;

            for op in ops {
                let label = |student: bool| if student { "Student" } else { "Regular" };
                match op {
                    Op::Scan { tag, student } => {
                        let len = m.session().unwrap().log.len();
                        match scan(&mut m, &format!("T{}", tag), label(student)).await {
                            Ok(_) => assert_eq!(m.session().unwrap().log.len(), len + 1),
                            Err(SessionError::BalanceDenied { .. }) => {
                                assert_eq!(m.session().unwrap().log.len(), len)
                            }
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                    Op::Manual { student } => {
                        m.add_manual(label(student)).await.unwrap();
                    }
                    Op::Delete(i) => {
                        let log = &m.session().unwrap().log;
                        if !log.is_empty() {
                            let id = log[i % log.len()].id.clone();
                            m.delete_log_entry(&id).await.unwrap();
                        }
                    }
                }
            }

            let running = m.running_total().unwrap();
            let passengers = m.session().unwrap().log.len();
            let record = submitted(&m.end().await.unwrap());

            assert_eq!(record.total_claimed_money, running);
            assert_eq!(
                record.total_claimed_money,
                record.logs.iter().map(|l| l.fare).sum::<Decimal>()
            );
            assert_eq!(record.total_passengers, passengers);
            assert_eq!(record.passenger_counts.values().sum::<usize>(), passengers);
        });
    }
}
