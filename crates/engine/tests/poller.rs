//! Timing tests for the polling loop, run against paused tokio time.
//!
//! The schedule under test: first check after 60s, second after 30s,
//! then every 15s, with a hard 5-minute ceiling from job start.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{Probe, ScriptedStore};
use quantdesk_core::content::AnalysisContent;
use quantdesk_core::outcome::{DeliverySource, JobOutcome};
use quantdesk_core::status::JobStatus;
use quantdesk_engine::poller::{poll_job, PollSchedule};
use quantdesk_engine::registry::DeliveryRegistry;

type DeliveryLog = Arc<Mutex<Vec<(String, DeliverySource, u64)>>>;

/// Register a handler that records (outcome kind, source, elapsed secs).
fn register_logging_handler(registry: &DeliveryRegistry, job_id: i64) -> DeliveryLog {
    let log: DeliveryLog = Arc::default();
    let log_clone = Arc::clone(&log);
    let started = tokio::time::Instant::now();
    registry
        .register(
            job_id,
            Box::new(move |outcome: JobOutcome, source| {
                log_clone.lock().unwrap().push((
                    outcome.kind().to_string(),
                    source,
                    started.elapsed().as_secs(),
                ));
            }),
        )
        .unwrap();
    log
}

fn spawn_poller(store: &Arc<ScriptedStore>, registry: &Arc<DeliveryRegistry>, job_id: i64) -> CancellationToken {
    let cancel = CancellationToken::new();
    let store: Arc<dyn quantdesk_engine::store::JobStore> = store.clone();
    tokio::spawn(poll_job(
        store,
        Arc::clone(registry),
        job_id,
        PollSchedule::default(),
        cancel.clone(),
    ));
    cancel
}

// ---------------------------------------------------------------------------
// Test: full schedule with no result, ending in a local timeout
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn checks_follow_progressive_schedule_then_time_out() {
    let store = Arc::new(ScriptedStore::always_running());
    let registry = Arc::new(DeliveryRegistry::new());
    let log = register_logging_handler(&registry, 1);

    spawn_poller(&store, &registry, 1);
    tokio::time::sleep(Duration::from_secs(400)).await;

    // 60, 90, then every 15s up to 285. The check that would land at 300
    // is never issued: 285 + 15 is not strictly inside the window.
    let mut expected = vec![60u64, 90];
    expected.extend((105..=285).step_by(15));
    assert_eq!(*store.probe_times.lock().unwrap(), expected);

    // The timeout is declared immediately after the 285s check comes
    // back non-terminal, and persisted once.
    assert_eq!(*store.timed_out_marks.lock().unwrap(), vec![285]);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(
        *log,
        vec![("timed_out".to_string(), DeliverySource::Poll, 285)]
    );
}

#[tokio::test(start_paused = true)]
async fn no_network_activity_after_timeout() {
    let store = Arc::new(ScriptedStore::always_running());
    let registry = Arc::new(DeliveryRegistry::new());
    let _log = register_logging_handler(&registry, 2);

    spawn_poller(&store, &registry, 2);
    tokio::time::sleep(Duration::from_secs(300)).await;
    let count_at_deadline = store.probe_count();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(store.probe_count(), count_at_deadline);
}

// ---------------------------------------------------------------------------
// Test: terminal statuses stop the schedule
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn terminal_result_is_delivered_and_polling_stops() {
    let store = Arc::new(ScriptedStore::new(vec![
        Probe::Running,
        Probe::Terminal(
            JobStatus::Done,
            Some(serde_json::json!({"text": "breakout confirmed"})),
            None,
        ),
    ]));
    let registry = Arc::new(DeliveryRegistry::new());
    let log: Arc<Mutex<Vec<JobOutcome>>> = Arc::default();
    let log_clone = Arc::clone(&log);
    registry
        .register(
            3,
            Box::new(move |outcome, _| log_clone.lock().unwrap().push(outcome)),
        )
        .unwrap();

    spawn_poller(&store, &registry, 3);
    tokio::time::sleep(Duration::from_secs(400)).await;

    assert_eq!(*store.probe_times.lock().unwrap(), vec![60, 90]);
    assert!(store.timed_out_marks.lock().unwrap().is_empty());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    match &log[0] {
        JobOutcome::Done(AnalysisContent::Text { text }) => {
            assert_eq!(text, "breakout confirmed");
        }
        other => panic!("Expected Done(Text), got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn error_status_delivers_error_outcome() {
    let store = Arc::new(ScriptedStore::new(vec![Probe::Terminal(
        JobStatus::Error,
        None,
        Some("model overloaded".into()),
    )]));
    let registry = Arc::new(DeliveryRegistry::new());
    let log = register_logging_handler(&registry, 4);

    spawn_poller(&store, &registry, 4);
    tokio::time::sleep(Duration::from_secs(120)).await;

    let log = log.lock().unwrap();
    assert_eq!(*log, vec![("error".to_string(), DeliverySource::Poll, 60)]);
}

// ---------------------------------------------------------------------------
// Test: transient failures keep the schedule, deadline is not restarted
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_failures_do_not_abandon_the_job() {
    let store = Arc::new(ScriptedStore::new(vec![
        Probe::Unavailable,
        Probe::Malformed,
        Probe::Running,
        Probe::Terminal(JobStatus::Done, Some(serde_json::json!("flat")), None),
    ]));
    let registry = Arc::new(DeliveryRegistry::new());
    let log = register_logging_handler(&registry, 5);

    spawn_poller(&store, &registry, 5);
    tokio::time::sleep(Duration::from_secs(200)).await;

    // Failures at 60 and 90 did not interrupt the cadence; the result
    // lands on the fourth check at 120s.
    assert_eq!(*store.probe_times.lock().unwrap(), vec![60, 90, 105, 120]);
    let log = log.lock().unwrap();
    assert_eq!(*log, vec![("done".to_string(), DeliverySource::Poll, 120)]);
}

#[tokio::test(start_paused = true)]
async fn persistent_transient_failures_still_hit_the_deadline() {
    let failures: Vec<Probe> = (0..20).map(|_| Probe::Unavailable).collect();
    let store = Arc::new(ScriptedStore::new(failures));
    let registry = Arc::new(DeliveryRegistry::new());
    let log = register_logging_handler(&registry, 6);

    spawn_poller(&store, &registry, 6);
    tokio::time::sleep(Duration::from_secs(400)).await;

    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec![("timed_out".to_string(), DeliverySource::Poll, 285)]
    );
}

// ---------------------------------------------------------------------------
// Test: a missing row is an inconsistency, not a blip
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn missing_job_row_surfaces_an_error() {
    let store = Arc::new(ScriptedStore::new(vec![Probe::Running, Probe::NotFound]));
    let registry = Arc::new(DeliveryRegistry::new());
    let log = register_logging_handler(&registry, 7);

    spawn_poller(&store, &registry, 7);
    tokio::time::sleep(Duration::from_secs(400)).await;

    assert_eq!(store.probe_count(), 2);
    let log = log.lock().unwrap();
    assert_eq!(*log, vec![("error".to_string(), DeliverySource::Poll, 90)]);
}

// ---------------------------------------------------------------------------
// Test: cancellation stops all pending timers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancellation_stops_pending_checks() {
    let store = Arc::new(ScriptedStore::always_running());
    let registry = Arc::new(DeliveryRegistry::new());
    let log = register_logging_handler(&registry, 8);

    let cancel = spawn_poller(&store, &registry, 8);
    tokio::time::sleep(Duration::from_secs(10)).await;
    cancel.cancel();
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(store.probe_count(), 0);
    assert!(log.lock().unwrap().is_empty());
}
