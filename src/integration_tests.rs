//! End-to-end tests of the booking saga against scripted activities

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::booking::steps::ALL_ACTIVITIES;
use crate::{
    recover_transactions, register_booking_activities, Activity, ActivityRegistry, BookingRequest,
    BookingSaga, ClientConfig, InMemoryJournal, JournalEntry, JournalError, LocalExecutor, RollbackReporting, RollbackStatus,
    SagaClient, SagaConfig, SagaContext, SagaObserver, SagaStats, SimulatedServices, StepError,
    TransactionEvent, TransactionId, TransactionJournal, TransactionResult, Worker,
};

type CallLog = Arc<Mutex<Vec<String>>>;

/// Pops one scripted error per call, then succeeds
struct ScriptedActivity {
    name: &'static str,
    failures: Mutex<VecDeque<StepError>>,
    always_fail: Option<StepError>,
    hang: bool,
    calls: CallLog,
}

#[async_trait]
impl Activity for ScriptedActivity {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        _context: &SagaContext,
        input: &BookingRequest,
    ) -> Result<String, StepError> {
        self.calls.lock().unwrap().push(self.name.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let (verb, resource) = self.name.split_once('_').unwrap();
        let id = match resource {
            "car" => &input.car_id,
            "hotel" => &input.hotel_id,
            _ => &input.flight_id,
        };
        let verb = if verb == "reserve" { "Booked" } else { "Cancelled" };
        Ok(format!("{} {}: {}", verb, resource, id))
    }
}

#[derive(Default)]
struct RecordingObserver {
    retry_delays: Mutex<Vec<(String, Duration)>>,
    compensations: Mutex<Vec<String>>,
}

impl SagaObserver for RecordingObserver {
    fn on_transaction_started(&self, _context: &SagaContext) {}
    fn on_step_started(&self, _context: &SagaContext, _activity: &str) {}
    fn on_step_completed(&self, _context: &SagaContext, _activity: &str, _duration_millis: u64) {}
    fn on_step_retry(&self, _context: &SagaContext, activity: &str, _error: &str, delay: Duration) {
        self.retry_delays
            .lock()
            .unwrap()
            .push((activity.to_string(), delay));
    }
    fn on_step_failed(&self, _context: &SagaContext, _activity: &str, _error: &str) {}
    fn on_compensation_started(&self, _context: &SagaContext, step: &str) {
        self.compensations.lock().unwrap().push(step.to_string());
    }
    fn on_compensation_completed(&self, _context: &SagaContext, _step: &str) {}
    fn on_compensation_failed(&self, _context: &SagaContext, _step: &str, _error: &str) {}
    fn on_transaction_completed(&self, _context: &SagaContext) {}
    fn on_transaction_cancelled(&self, _context: &SagaContext, _reason: &str) {}
}

/// Keeps pruned journals aside so tests can inspect finished transactions
#[derive(Default)]
struct ArchivingJournal {
    live: InMemoryJournal,
    archive: Mutex<HashMap<TransactionId, Vec<JournalEntry>>>,
}

impl TransactionJournal for ArchivingJournal {
    fn append(&self, transaction_id: &TransactionId, event: TransactionEvent) -> Result<u64, JournalError> {
        self.live.append(transaction_id, event)
    }

    fn read(&self, transaction_id: &TransactionId) -> Result<Vec<JournalEntry>, JournalError> {
        self.live.read(transaction_id)
    }

    fn list_transactions(&self) -> Result<Vec<TransactionId>, JournalError> {
        self.live.list_transactions()
    }

    fn prune(&self, transaction_id: &TransactionId) -> Result<(), JournalError> {
        let entries = self.live.read(transaction_id)?;
        self.archive
            .lock()
            .unwrap()
            .insert(transaction_id.clone(), entries);
        self.live.prune(transaction_id)
    }
}

#[derive(Default)]
struct Script {
    failures: HashMap<&'static str, Vec<StepError>>,
    always_fail: HashMap<&'static str, StepError>,
    hang: Vec<&'static str>,
    reporting: RollbackReporting,
}

impl Script {
    fn fail(mut self, activity: &'static str, errors: Vec<StepError>) -> Self {
        self.failures.insert(activity, errors);
        self
    }

    fn always_fail(mut self, activity: &'static str, error: StepError) -> Self {
        self.always_fail.insert(activity, error);
        self
    }

    fn hang(mut self, activity: &'static str) -> Self {
        self.hang.push(activity);
        self
    }

    fn strict(mut self) -> Self {
        self.reporting = RollbackReporting::Strict;
        self
    }
}

struct Harness {
    saga: BookingSaga<LocalExecutor>,
    calls: CallLog,
    observer: Arc<RecordingObserver>,
    journal: Arc<ArchivingJournal>,
    stats: Arc<SagaStats>,
}

impl Harness {
    fn new(script: Script) -> Self {
        Self::with_journal(script, Arc::new(ArchivingJournal::default()))
    }

    fn with_journal(mut script: Script, journal: Arc<ArchivingJournal>) -> Self {
        let calls = CallLog::default();
        let mut registry = ActivityRegistry::new();
        for name in ALL_ACTIVITIES {
            registry.register(Arc::new(ScriptedActivity {
                name,
                failures: Mutex::new(script.failures.remove(name).unwrap_or_default().into()),
                always_fail: script.always_fail.remove(name),
                hang: script.hang.contains(&name),
                calls: calls.clone(),
            }));
        }

        let observer = Arc::new(RecordingObserver::default());
        let stats = Arc::new(SagaStats::new());
        let executor = Arc::new(
            LocalExecutor::new(registry)
                .with_observer(observer.clone())
                .with_stats(stats.clone()),
        );
        let saga = BookingSaga::new(
            executor,
            SagaConfig::default().with_rollback_reporting(script.reporting),
        )
        .with_journal(journal.clone())
        .with_observer(observer.clone())
        .with_stats(stats.clone());

        Self {
            saga,
            calls,
            observer,
            journal,
            stats,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn retry_delays(&self) -> Vec<(String, Duration)> {
        self.observer.retry_delays.lock().unwrap().clone()
    }

    /// Journal of a finished transaction
    fn events(&self, traveler: &str) -> Vec<TransactionEvent> {
        self.journal.archive.lock().unwrap()[&TransactionId::new(traveler)]
            .clone()
            .into_iter()
            .map(|e| e.event)
            .collect()
    }
}

fn request(traveler: &str, attempts: u32) -> BookingRequest {
    BookingRequest::new(traveler, "C1", "H1", "F1", attempts).unwrap()
}

fn calls(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_all_steps_succeed() {
    let harness = Harness::new(Script::default());

    let result = harness.saga.run(request("jane-123456", 1)).await;

    assert_eq!(
        result,
        TransactionResult::Success {
            confirmation: "Booked car: C1 Booked hotel: H1 Booked flight: F1".into()
        }
    );
    assert_eq!(
        harness.calls(),
        calls(&["reserve_car", "reserve_hotel", "reserve_flight"])
    );
    assert!(harness.observer.compensations.lock().unwrap().is_empty());

    let events = harness.events("jane-123456");
    assert!(matches!(events.last(), Some(TransactionEvent::TransactionCompleted { .. })));

    let stats = harness.stats.snapshot();
    assert_eq!(stats.transactions_completed, 1);
    assert_eq!(stats.activity_attempts, 3);
    assert_eq!(stats.compensations_started, 0);
}

#[tokio::test(start_paused = true)]
async fn test_flight_failure_rolls_back_hotel_then_car() {
    let harness = Harness::new(
        Script::default().always_fail("reserve_flight", StepError::non_retryable("sold out")),
    );

    let result = harness.saga.run(request("jane-123456", 1)).await;

    assert_eq!(result, TransactionResult::Cancelled);
    assert_eq!(result.message(), "Voyage cancelled");
    assert_eq!(
        harness.calls(),
        calls(&[
            "reserve_car",
            "reserve_hotel",
            "reserve_flight",
            "cancel_hotel",
            "cancel_car",
        ])
    );
    assert!(harness.retry_delays().is_empty());
    assert_eq!(harness.stats.snapshot().transactions_cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_flight_attempts_exhausted() {
    let harness = Harness::new(
        Script::default().always_fail("reserve_flight", StepError::retryable("no seats yet")),
    );

    let result = harness.saga.run(request("jane-123456", 3)).await;

    assert!(result.is_cancelled());
    assert_eq!(
        harness.calls(),
        calls(&[
            "reserve_car",
            "reserve_hotel",
            "reserve_flight",
            "reserve_flight",
            "reserve_flight",
            "cancel_hotel",
            "cancel_car",
        ])
    );
    assert_eq!(
        harness.retry_delays(),
        vec![
            ("reserve_flight".to_string(), Duration::from_secs(1)),
            ("reserve_flight".to_string(), Duration::from_secs(1)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_car_failure_compensates_nothing() {
    let harness = Harness::new(
        Script::default().always_fail("reserve_car", StepError::non_retryable("invalid car id")),
    );

    let result = harness.saga.run(request("jane-123456", 1)).await;

    assert_eq!(result, TransactionResult::Cancelled);
    assert_eq!(harness.calls(), calls(&["reserve_car"]));
    assert!(harness.observer.compensations.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hotel_failure_cancels_car_only() {
    let harness = Harness::new(
        Script::default().always_fail("reserve_hotel", StepError::non_retryable("invalid hotel id")),
    );

    harness.saga.run(request("jane-123456", 1)).await;

    assert_eq!(
        harness.calls(),
        calls(&["reserve_car", "reserve_hotel", "cancel_car"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_flight_succeeds_on_third_attempt() {
    let harness = Harness::new(Script::default().fail(
        "reserve_flight",
        vec![
            StepError::retryable("flight service unavailable"),
            StepError::retryable("flight service unavailable"),
        ],
    ));

    let result = harness.saga.run(request("jane-123456", 3)).await;

    assert!(result.is_success());
    let flight_calls = harness
        .calls()
        .into_iter()
        .filter(|c| c == "reserve_flight")
        .count();
    assert_eq!(flight_calls, 3);
    assert_eq!(harness.retry_delays().len(), 2);
    assert_eq!(harness.stats.snapshot().activity_retries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_car_retries_with_backoff_until_success() {
    let harness = Harness::new(Script::default().fail(
        "reserve_car",
        vec![
            StepError::retryable("car service unavailable"),
            StepError::retryable("car service unavailable"),
        ],
    ));

    let result = harness.saga.run(request("jane-123456", 1)).await;

    assert!(result.is_success());
    assert_eq!(
        harness.retry_delays(),
        vec![
            ("reserve_car".to_string(), Duration::from_secs(1)),
            ("reserve_car".to_string(), Duration::from_secs(2)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_flight_timeout_rolls_back() {
    let harness = Harness::new(Script::default().hang("reserve_flight"));

    let result = harness.saga.run(request("jane-123456", 1)).await;

    assert_eq!(result, TransactionResult::Cancelled);
    let events = harness.events("jane-123456");
    assert!(events.iter().any(|e| matches!(
        e,
        TransactionEvent::StepFailed { error: StepError::Timeout { .. }, .. }
    )));
    assert_eq!(
        harness.calls()[3..],
        calls(&["cancel_hotel", "cancel_car"])[..]
    );
}

#[tokio::test(start_paused = true)]
async fn test_strict_reporting_keeps_failure() {
    let harness = Harness::new(
        Script::default()
            .always_fail("reserve_flight", StepError::non_retryable("sold out"))
            .strict(),
    );

    let result = harness.saga.run(request("jane-123456", 1)).await;

    assert_eq!(
        result,
        TransactionResult::Failed {
            rollback: RollbackStatus::RolledBack,
            error: "sold out".into(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_compensation_does_not_stop_rollback() {
    let harness = Harness::new(
        Script::default()
            .always_fail("reserve_flight", StepError::non_retryable("sold out"))
            .always_fail("cancel_hotel", StepError::retryable("hotel service down"))
            .strict(),
    );

    let result = harness.saga.run(request("jane-123456", 1)).await;

    assert_eq!(
        harness.calls()[3..],
        calls(&["cancel_hotel", "cancel_car"])[..]
    );
    match result {
        TransactionResult::Failed {
            rollback: RollbackStatus::RollbackFailed { compensation_error },
            error,
        } => {
            assert!(compensation_error.contains("hotel"));
            assert_eq!(&*error, "sold out");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(harness.stats.snapshot().compensations_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_runs_no_activity() {
    let harness = Harness::new(Script::default());
    let mut request = request("jane-123456", 1);
    request.max_flight_attempts = 0;

    let result = harness.saga.run(request).await;

    assert_eq!(result, TransactionResult::Cancelled);
    assert!(harness.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transactions_are_independent() {
    let harness = Harness::new(Script::default().fail(
        "reserve_flight",
        vec![StepError::non_retryable("sold out")],
    ));

    let (first, second) = tokio::join!(
        harness.saga.run(request("jane-111111", 1)),
        harness.saga.run(request("john-222222", 1)),
    );

    // exactly one of them consumed the scripted flight failure
    assert!(first.is_success() != second.is_success());
    let cancels = harness
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("cancel_"))
        .count();
    assert_eq!(cancels, 2);
    let archive = harness.journal.archive.lock().unwrap();
    assert!(archive.contains_key(&TransactionId::new("jane-111111")));
    assert!(archive.contains_key(&TransactionId::new("john-222222")));
}

#[tokio::test(start_paused = true)]
async fn test_journal_is_pruned_after_terminal_result() {
    let mut registry = ActivityRegistry::new();
    register_booking_activities(&mut registry, SimulatedServices::new());
    let journal = Arc::new(InMemoryJournal::new());
    let saga = BookingSaga::new(Arc::new(LocalExecutor::new(registry)), SagaConfig::default())
        .with_journal(journal.clone());

    let completed = saga.run(request("jane-123456", 1)).await;
    let mut blank_hotel = request("john-654321", 1);
    blank_hotel.hotel_id = "".into();
    let cancelled = saga.run(blank_hotel).await;

    assert!(completed.is_success());
    assert!(cancelled.is_cancelled());
    assert!(journal.list_transactions().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resume_forward_from_journal() {
    let journal = Arc::new(ArchivingJournal::default());
    let id = TransactionId::new("jane-123456");
    journal
        .append(
            &id,
            TransactionEvent::TransactionStarted {
                request: request("jane-123456", 1),
                started_at_millis: 1,
            },
        )
        .unwrap();
    journal
        .append(
            &id,
            TransactionEvent::StepCompleted {
                step_index: 0,
                step: "car".into(),
                confirmation: "Booked car: C1".into(),
                completed_at_millis: 2,
            },
        )
        .unwrap();

    let harness = Harness::with_journal(Script::default(), journal.clone());
    let mut points = recover_transactions(journal.as_ref()).unwrap();
    assert_eq!(points.len(), 1);

    let result = harness.saga.resume(points.remove(0)).await;

    assert_eq!(
        result,
        TransactionResult::Success {
            confirmation: "Booked car: C1 Booked hotel: H1 Booked flight: F1".into()
        }
    );
    assert_eq!(harness.calls(), calls(&["reserve_hotel", "reserve_flight"]));
    assert!(recover_transactions(journal.as_ref()).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resume_interrupted_rollback() {
    let journal = Arc::new(ArchivingJournal::default());
    let id = TransactionId::new("jane-123456");
    let events = [
        TransactionEvent::TransactionStarted {
            request: request("jane-123456", 1),
            started_at_millis: 1,
        },
        TransactionEvent::StepCompleted {
            step_index: 0,
            step: "car".into(),
            confirmation: "Booked car: C1".into(),
            completed_at_millis: 2,
        },
        TransactionEvent::StepCompleted {
            step_index: 1,
            step: "hotel".into(),
            confirmation: "Booked hotel: H1".into(),
            completed_at_millis: 3,
        },
        TransactionEvent::StepFailed {
            step_index: 2,
            step: "flight".into(),
            error: StepError::non_retryable("sold out"),
            failed_at_millis: 4,
        },
    ];
    for event in events {
        journal.append(&id, event).unwrap();
    }

    let harness = Harness::with_journal(Script::default(), journal.clone());
    let mut points = recover_transactions(journal.as_ref()).unwrap();
    let result = harness.saga.resume(points.remove(0)).await;

    assert_eq!(result, TransactionResult::Cancelled);
    assert_eq!(harness.calls(), calls(&["cancel_hotel", "cancel_car"]));
    assert!(matches!(
        harness.events("jane-123456").last(),
        Some(TransactionEvent::TransactionRolledBack { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_worker_resumes_unfinished_transactions_on_start() {
    let journal = Arc::new(ArchivingJournal::default());
    let id = TransactionId::new("jane-123456");
    journal
        .append(
            &id,
            TransactionEvent::TransactionStarted {
                request: request("jane-123456", 1),
                started_at_millis: 1,
            },
        )
        .unwrap();

    let harness = Harness::with_journal(Script::default(), journal.clone());
    let saga = Arc::new(harness.saga);
    let client = SagaClient::connect(ClientConfig::default()).unwrap();
    let worker = Worker::new(&client, "bookings", saga).unwrap();

    // shut down right away; in-flight recoveries are still awaited
    worker.run(async {}).await;

    assert_eq!(
        harness.calls.lock().unwrap().clone(),
        calls(&["reserve_car", "reserve_hotel", "reserve_flight"])
    );
    assert!(recover_transactions(journal.as_ref()).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_through_worker() {
    let mut registry = ActivityRegistry::new();
    register_booking_activities(
        &mut registry,
        SimulatedServices::new().with_transient_flight_failures(2),
    );
    let observer = Arc::new(RecordingObserver::default());
    let executor = Arc::new(LocalExecutor::new(registry).with_observer(observer.clone()));
    let saga = Arc::new(BookingSaga::new(executor, SagaConfig::default()));

    let client = SagaClient::connect(ClientConfig::default()).unwrap();
    let worker = Worker::new(&client, "bookings", saga).unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(worker.run(async move {
        let _ = stopped.await;
    }));

    let result = client
        .execute_transaction("bookings", request("jane-123456", 3))
        .await
        .unwrap();
    assert_eq!(
        result,
        TransactionResult::Success {
            confirmation: "Booked car: C1 Booked hotel: H1 Booked flight: F1".into()
        }
    );
    assert_eq!(observer.retry_delays.lock().unwrap().len(), 2);

    let rejected = client
        .execute_transaction("bookings", request("jane-123456", 3))
        .await;
    assert!(rejected.is_err());

    let cancelled = client
        .execute_transaction("bookings", request("john-654321", 1))
        .await
        .unwrap();
    assert_eq!(cancelled, TransactionResult::Cancelled);

    stop.send(()).unwrap();
    handle.await.unwrap();
}
