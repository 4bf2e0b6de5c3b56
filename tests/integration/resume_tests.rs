//! Resume, crash-recovery and shutdown behavior across runs
//!
//! Each test runs the orchestrator over a `JsonStateStore` in a temporary
//! directory, then inspects the snapshot the run left behind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_sweep::config::RetryGating;
use sumi_sweep::engine::{
    policy_from_threshold, BackoffPolicy, FnPerformer, Orchestrator, PerformError, Performer,
    RunOptions, Summary,
};
use sumi_sweep::output::{ResultSink, SinkResult};
use sumi_sweep::storage::{StateMap, StateStore, StorageError, StorageResult};
use sumi_sweep::{AttemptRecord, ItemState, ItemStatus, JsonStateStore, SweepError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Records every stored result in memory
#[derive(Default)]
struct RecordingSink {
    saved: Mutex<Vec<String>>,
}

impl ResultSink<String> for RecordingSink {
    fn save(&self, key: &str, _content: &String) -> SinkResult<String> {
        let mut saved = self.saved.lock().unwrap();
        saved.push(key.to_string());
        Ok(format!("mem:{}", saved.len()))
    }
}

/// Scripted operation: keys listed in `failing` always fail recoverably,
/// keys in `fatal` fail fatally, everything else succeeds
#[derive(Default)]
struct Script {
    failing: Vec<String>,
    fatal: Vec<String>,
    calls: Mutex<BTreeMap<String, usize>>,
    total: AtomicUsize,
}

impl Script {
    fn failing(keys: &[&str]) -> Self {
        Self {
            failing: keys.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn called_keys(&self) -> Vec<String> {
        self.calls.lock().unwrap().keys().cloned().collect()
    }
}

impl Performer for Script {
    type Content = String;

    async fn perform(&self, key: &str) -> Result<String, PerformError> {
        *self.calls.lock().unwrap().entry(key.to_string()).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.fatal.iter().any(|k| k == key) {
            Err(PerformError::fatal("browser went away"))
        } else if self.failing.iter().any(|k| k == key) {
            Err(PerformError::recoverable("HTTP 503"))
        } else {
            Ok(format!("content of {}", key))
        }
    }
}

fn options(max_attempts: u32, gating: RetryGating) -> RunOptions {
    RunOptions {
        concurrency: 3,
        max_attempts,
        backoff: BackoffPolicy::linear(Duration::from_millis(1), Duration::from_millis(5)),
        gating,
    }
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

fn open_store(dir: &TempDir) -> Arc<JsonStateStore> {
    Arc::new(JsonStateStore::new(&dir.path().join("state/processing_status.json")).unwrap())
}

fn orchestrator<P: Performer<Content = String>>(
    store: &Arc<JsonStateStore>,
    performer: &Arc<P>,
    options: RunOptions,
) -> Orchestrator<P> {
    Orchestrator::new(
        Arc::clone(store) as Arc<dyn StateStore>,
        Arc::clone(performer),
        Arc::new(RecordingSink::default()),
        options,
    )
}

fn completed(key: &str) -> ItemState {
    let now = chrono::Utc::now();
    let mut state = ItemState::new(key);
    state.begin(now);
    state.record_attempt(AttemptRecord::success(1, now, now));
    state.complete("result_1.json".to_string(), now);
    state
}

#[tokio::test]
async fn test_second_run_finds_nothing_to_do() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let script = Arc::new(Script::default());
    let all = keys(&["a", "b", "c", "d"]);
    let cancel = CancellationToken::new();

    let first = orchestrator(&store, &script, options(3, RetryGating::Backoff))
        .run(&all, &cancel)
        .await
        .unwrap();
    assert_eq!(first.completed, 4);

    let second = orchestrator(&store, &script, options(3, RetryGating::Backoff))
        .run(&all, &cancel)
        .await
        .unwrap();
    assert_eq!(second, Summary::default());
    assert_eq!(script.total.load(Ordering::SeqCst), 4);

    let items = store.load().unwrap();
    assert!(items.values().all(|s| s.status == ItemStatus::Completed));
    assert!(items.values().all(|s| s.result_ref.is_some()));
}

#[tokio::test]
async fn test_attempt_numbers_continue_across_runs() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let script = Arc::new(Script::failing(&["flaky"]));
    let all = keys(&["flaky"]);
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let summary = orchestrator(&store, &script, options(2, RetryGating::Immediate))
            .run(&all, &cancel)
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
    }

    let state = store.load().unwrap().remove("flaky").unwrap();
    let numbers: Vec<u32> = state.attempts.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(state.status, ItemStatus::FailedRetryable);
    assert_eq!(state.last_error.as_deref(), Some("HTTP 503"));
    assert!(state.check_invariants().is_ok());
}

#[tokio::test]
async fn test_resume_after_crash_processes_only_unfinished() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut dead = ItemState::new("dead");
    dead.status = ItemStatus::FailedPermanent;
    dead.last_error = Some("HTTP 404".to_string());

    let mut crashed = ItemState::new("crashed");
    crashed.status = ItemStatus::InProgress;

    let mut snapshot = StateMap::new();
    snapshot.insert("done".to_string(), completed("done"));
    snapshot.insert("dead".to_string(), dead);
    snapshot.insert("waiting".to_string(), ItemState::new("waiting"));
    snapshot.insert("crashed".to_string(), crashed);
    store.save_all(&snapshot).unwrap();

    let script = Arc::new(Script::default());
    let all = keys(&["done", "dead", "waiting", "fresh", "crashed"]);
    let summary = orchestrator(&store, &script, options(3, RetryGating::Backoff))
        .run(&all, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.completed, 3);
    assert_eq!(script.called_keys(), vec!["crashed", "fresh", "waiting"]);

    let items = store.load().unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items["dead"].status, ItemStatus::FailedPermanent);
    assert_eq!(items["done"].attempts.len(), 1);
    assert!(items
        .values()
        .all(|s| s.status != ItemStatus::InProgress && s.status != ItemStatus::Pending));
}

#[tokio::test]
async fn test_corrupt_state_file_runs_as_fresh() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    std::fs::write(store.path(), b"{ this is not json").unwrap();

    let script = Arc::new(Script::default());
    let summary = orchestrator(&store, &script, options(3, RetryGating::Backoff))
        .run(&keys(&["a", "b"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(store.load().unwrap().len(), 2);
}

#[tokio::test]
async fn test_backoff_gating_skips_recent_failures() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let script = Arc::new(Script::failing(&["slow"]));
    let all = keys(&["slow"]);
    let cancel = CancellationToken::new();

    let mut gated = options(1, RetryGating::Backoff);
    gated.backoff = BackoffPolicy::linear(Duration::from_secs(3600), Duration::from_secs(3600));

    let first = orchestrator(&store, &script, gated).run(&all, &cancel).await.unwrap();
    assert_eq!(first.failed, 1);

    let second = orchestrator(&store, &script, gated).run(&all, &cancel).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(script.calls_for("slow"), 1);

    let third = orchestrator(&store, &script, options(1, RetryGating::Immediate))
        .run(&all, &cancel)
        .await
        .unwrap();
    assert_eq!(third.failed, 1);
    assert_eq!(script.calls_for("slow"), 2);
}

#[tokio::test]
async fn test_lifetime_threshold_marks_permanent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let script = Arc::new(Script::failing(&["gone"]));
    let all = keys(&["gone"]);
    let cancel = CancellationToken::new();

    let run = || {
        orchestrator(&store, &script, options(2, RetryGating::Immediate))
            .with_failure_policy(policy_from_threshold(Some(4)))
    };

    assert_eq!(run().run(&all, &cancel).await.unwrap().failed, 1);
    assert_eq!(run().run(&all, &cancel).await.unwrap().permanently_failed, 1);
    assert!(run().run(&all, &cancel).await.unwrap().is_empty());

    let state = store.load().unwrap().remove("gone").unwrap();
    assert_eq!(state.status, ItemStatus::FailedPermanent);
    assert_eq!(state.attempt_count(), 4);
}

#[tokio::test]
async fn test_shutdown_before_start_leaves_items_unfinished() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let script = Arc::new(Script::default());

    let cancel = CancellationToken::new();
    cancel.cancel();
    cancel.cancel();

    let summary = orchestrator(&store, &script, options(3, RetryGating::Backoff))
        .run(&keys(&["a", "b", "c"]), &cancel)
        .await
        .unwrap();

    assert_eq!(summary.interrupted, 3);
    assert_eq!(script.total.load(Ordering::SeqCst), 0);

    let items = store.load().unwrap();
    assert!(items.values().all(|s| s.status == ItemStatus::Pending));
    assert!(items.values().all(|s| s.attempts.is_empty()));
}

#[tokio::test]
async fn test_fatal_error_aborts_and_flushes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let script = Arc::new(Script {
        fatal: keys(&["b"]),
        ..Script::default()
    });

    let mut serial = options(3, RetryGating::Backoff);
    serial.concurrency = 1;

    let result = orchestrator(&store, &script, serial)
        .run(&keys(&["a", "b", "c"]), &CancellationToken::new())
        .await;

    match result {
        Err(SweepError::FatalOperation { key, message }) => {
            assert_eq!(key, "b");
            assert_eq!(message, "browser went away");
        }
        other => panic!("expected fatal operation error, got {:?}", other),
    }

    let items = store.load().unwrap();
    assert_eq!(items["a"].status, ItemStatus::Completed);
    assert_eq!(items["b"].status, ItemStatus::FailedRetryable);
    assert_eq!(items["b"].attempt_count(), 1);
    assert_eq!(items["c"].status, ItemStatus::Pending);
    assert_eq!(script.calls_for("c"), 0);
}

/// Loads an empty map and refuses every write
struct ReadOnlyStore;

impl StateStore for ReadOnlyStore {
    fn load(&self) -> StorageResult<StateMap> {
        Ok(StateMap::new())
    }

    fn save_all(&self, _items: &StateMap) -> StorageResult<()> {
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        )))
    }
}

#[tokio::test]
async fn test_persistence_failure_aborts_run() {
    let script = Arc::new(FnPerformer::new(|key: String| async move {
        Ok::<_, PerformError>(key)
    }));
    let orchestrator = Orchestrator::new(
        Arc::new(ReadOnlyStore),
        script,
        Arc::new(RecordingSink::default()),
        options(3, RetryGating::Backoff),
    );

    let result = orchestrator
        .run(&keys(&["a"]), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(SweepError::Storage(_))));
}

/// Requests shutdown while performing `trigger`; every attempt fails when
/// `fail` is set
struct ShutdownDuring {
    trigger: String,
    token: CancellationToken,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl ShutdownDuring {
    fn new(trigger: &str, token: &CancellationToken, fail: bool) -> Self {
        Self {
            trigger: trigger.to_string(),
            token: token.clone(),
            fail,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Performer for ShutdownDuring {
    type Content = String;

    async fn perform(&self, key: &str) -> Result<String, PerformError> {
        self.calls.lock().unwrap().push(key.to_string());
        if key == self.trigger {
            self.token.cancel();
        }
        tokio::task::yield_now().await;

        if self.fail {
            Err(PerformError::recoverable("HTTP 503"))
        } else {
            Ok(format!("content of {}", key))
        }
    }
}

#[tokio::test]
async fn test_shutdown_mid_run_finishes_in_flight_item() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();
    let performer = Arc::new(ShutdownDuring::new("a", &cancel, false));

    let mut serial = options(3, RetryGating::Backoff);
    serial.concurrency = 1;

    let summary = orchestrator(&store, &performer, serial)
        .run(&keys(&["a", "b", "c"]), &cancel)
        .await
        .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.interrupted, 2);
    assert_eq!(*performer.calls.lock().unwrap(), vec!["a"]);

    let items = store.load().unwrap();
    assert_eq!(items["a"].status, ItemStatus::Completed);
    assert_eq!(items["a"].attempt_count(), 1);
    for key in ["b", "c"] {
        assert_eq!(items[key].status, ItemStatus::Pending);
        assert!(items[key].attempts.is_empty());
    }
    assert!(items.values().all(|s| s.status != ItemStatus::InProgress));
    assert!(items.values().all(|s| s.check_invariants().is_ok()));
}

#[tokio::test]
async fn test_shutdown_mid_run_skips_remaining_retries() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let cancel = CancellationToken::new();
    let performer = Arc::new(ShutdownDuring::new("a", &cancel, true));

    let mut serial = options(3, RetryGating::Backoff);
    serial.concurrency = 1;

    let summary = orchestrator(&store, &performer, serial)
        .run(&keys(&["a", "b"]), &cancel)
        .await
        .unwrap();

    assert_eq!(summary.interrupted, 2);
    assert_eq!(performer.calls.lock().unwrap().len(), 1);

    let items = store.load().unwrap();
    assert_eq!(items["a"].status, ItemStatus::FailedRetryable);
    assert_eq!(items["a"].attempt_count(), 1);
    assert_eq!(items["a"].last_error.as_deref(), Some("HTTP 503"));
    assert_eq!(items["b"].status, ItemStatus::Pending);
    assert!(items.values().all(|s| s.check_invariants().is_ok()));
}

/// Keeps every snapshot written; the write numbered `fail_write` fails once
#[derive(Default)]
struct SnapshotStore {
    snapshots: Mutex<Vec<StateMap>>,
    writes: AtomicUsize,
    fail_write: Option<usize>,
}

impl SnapshotStore {
    fn seeded(items: StateMap) -> Self {
        Self {
            snapshots: Mutex::new(vec![items]),
            ..Self::default()
        }
    }

    fn all(&self) -> Vec<StateMap> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl StateStore for SnapshotStore {
    fn load(&self) -> StorageResult<StateMap> {
        Ok(self.snapshots.lock().unwrap().last().cloned().unwrap_or_default())
    }

    fn save_all(&self, items: &StateMap) -> StorageResult<()> {
        let write = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_write == Some(write) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk hiccup",
            )));
        }
        self.snapshots.lock().unwrap().push(items.clone());
        Ok(())
    }
}

fn successes(state: &ItemState) -> usize {
    state.attempts.iter().filter(|a| a.is_success()).count()
}

#[tokio::test]
async fn test_resume_from_any_snapshot_never_redoes_completed_items() {
    let all = keys(&["a", "b", "c"]);
    let store = Arc::new(SnapshotStore::default());
    let script = Arc::new(Script::failing(&["b"]));

    let summary = Orchestrator::new(
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::clone(&script),
        Arc::new(RecordingSink::default()),
        options(2, RetryGating::Immediate),
    )
    .run(&all, &CancellationToken::new())
    .await
    .unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);

    let snapshots = store.all();
    assert!(snapshots.len() > 3);

    for (n, snapshot) in snapshots.iter().enumerate() {
        for state in snapshot.values() {
            assert!(
                state.check_invariants().is_ok(),
                "snapshot {}: {:?}",
                n,
                state.check_invariants()
            );
        }

        // Resume as if the process had died right after this write
        let resumed = Arc::new(SnapshotStore::seeded(snapshot.clone()));
        let script = Arc::new(Script::failing(&["b"]));
        let sink = Arc::new(RecordingSink::default());
        Orchestrator::new(
            Arc::clone(&resumed) as Arc<dyn StateStore>,
            Arc::clone(&script),
            Arc::clone(&sink) as Arc<dyn ResultSink<String>>,
            options(2, RetryGating::Immediate),
        )
        .run(&all, &CancellationToken::new())
        .await
        .unwrap();

        let saved = sink.saved.lock().unwrap().clone();
        for (key, before) in snapshot {
            if before.status == ItemStatus::Completed {
                assert_eq!(script.calls_for(key), 0, "snapshot {}: {} redone", n, key);
                assert!(!saved.contains(key), "snapshot {}: {} stored twice", n, key);
            }
        }

        let finished = resumed.load().unwrap();
        for state in finished.values() {
            assert!(successes(state) <= 1, "snapshot {}: {:?}", n, state);
            assert!(state.check_invariants().is_ok(), "snapshot {}: {:?}", n, state);
        }
    }
}

#[tokio::test]
async fn test_failed_completion_write_is_not_redone() {
    // Write 1 starts the item, write 2 completes it
    let store = Arc::new(SnapshotStore {
        fail_write: Some(2),
        ..SnapshotStore::default()
    });
    let script = Arc::new(Script::default());
    let sink = Arc::new(RecordingSink::default());
    let run = || {
        Orchestrator::new(
            Arc::clone(&store) as Arc<dyn StateStore>,
            Arc::clone(&script),
            Arc::clone(&sink) as Arc<dyn ResultSink<String>>,
            options(3, RetryGating::Immediate),
        )
    };

    let all = keys(&["a"]);
    let first = run().run(&all, &CancellationToken::new()).await;
    assert!(matches!(first, Err(SweepError::Storage(_))));

    // The final flush still recorded the completion
    let state = store.load().unwrap().remove("a").unwrap();
    assert_eq!(state.status, ItemStatus::Completed);
    assert_eq!(successes(&state), 1);
    assert!(state.result_ref.is_some());
    assert!(state.check_invariants().is_ok());

    let second = run().run(&all, &CancellationToken::new()).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(script.total.load(Ordering::SeqCst), 1);
    assert_eq!(sink.saved.lock().unwrap().len(), 1);
}
