//! Coordinator integration: queue ordering, handle caching, timeouts.
//!
//! Run with: cargo test -p vaultline-wallet --test coordinator

mod mocks;

use mocks::{MockProvider, MockState};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use vaultline_runtime::{lock, FileLock};
use vaultline_wallet::{CoordinatorConfig, ServiceError, WalletCoordinator};

fn test_config(lock_dir: &Path) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::new(lock_dir);
    config.operation_timeout = Duration::from_secs(2);
    config.queue_poll_delay = Duration::from_millis(1);
    config.construct_settle_delay = Duration::from_millis(1);
    config.construct_retry_delay = Duration::from_millis(5);
    config.acquire_retry_delay = Duration::from_millis(5);
    config
}

fn setup(dir: &Path) -> (WalletCoordinator, Arc<MockState>) {
    let state = Arc::new(MockState::default());
    let provider = Arc::new(MockProvider::new(state.clone(), dir.join("snapshots")));
    let coordinator = WalletCoordinator::new(provider, test_config(&dir.join("db")));
    (coordinator, state)
}

#[tokio::test]
async fn test_operations_run_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _state) = setup(dir.path());

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let (o1, o2, o3) = (order.clone(), order.clone(), order.clone());
    let w1_completed: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let w2_started: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let (c1, s2) = (w1_completed.clone(), w2_started.clone());

    // Three operations across two wallets; the first is slow. Submission
    // order must hold globally, not per wallet: the second operation's body
    // must not start until the first has fully completed.
    let (r1, r2, r3) = tokio::join!(
        coordinator.execute("w1", move |_rt| async move {
            o1.lock().unwrap().push("first");
            tokio::time::sleep(Duration::from_millis(100)).await;
            *c1.lock().unwrap() = Some(Instant::now());
            Ok::<_, ServiceError>(())
        }),
        coordinator.execute("w2", move |_rt| async move {
            *s2.lock().unwrap() = Some(Instant::now());
            o2.lock().unwrap().push("second");
            Ok::<_, ServiceError>(())
        }),
        coordinator.execute("w1", move |_rt| async move {
            o3.lock().unwrap().push("third");
            Ok::<_, ServiceError>(())
        }),
    );
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);

    let completed = w1_completed.lock().unwrap().expect("first op recorded completion");
    let started = w2_started.lock().unwrap().expect("second op recorded start");
    assert!(
        started >= completed,
        "second operation started before the first completed"
    );
}

#[tokio::test]
async fn test_queued_operation_waits_for_held_wallet_lock() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _state) = setup(dir.path());
    let lock_dir = dir.path().join("db");

    let held = FileLock::acquire(&lock_dir, "w1", lock::DEFAULT_STALE_AGE).unwrap();

    let ran_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let ran = ran_at.clone();
    let queued = coordinator.clone();
    let task = tokio::spawn(async move {
        queued
            .execute("w1", move |_rt| async move {
                *ran.lock().unwrap() = Some(Instant::now());
                Ok::<_, ServiceError>(())
            })
            .await
    });

    // The drain must wait, not run the operation or release the lock.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(
        ran_at.lock().unwrap().is_none(),
        "operation ran while the wallet lock was held"
    );
    assert!(lock::marker_exists(&lock_dir, "w1"), "held lock was removed");

    let released_at = Instant::now();
    drop(held);
    task.await.unwrap().unwrap();
    let ran = ran_at.lock().unwrap().expect("operation ran after release");
    assert!(ran >= released_at);
}

#[tokio::test]
async fn test_handle_constructed_once_across_operations() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, state) = setup(dir.path());

    let (r1, r2, r3, r4, r5) = tokio::join!(
        coordinator.execute("w1", |_rt| async { Ok::<_, ServiceError>(1) }),
        coordinator.execute("w1", |_rt| async { Ok::<_, ServiceError>(2) }),
        coordinator.execute("w1", |_rt| async { Ok::<_, ServiceError>(3) }),
        coordinator.execute("w1", |_rt| async { Ok::<_, ServiceError>(4) }),
        coordinator.execute("w1", |_rt| async { Ok::<_, ServiceError>(5) }),
    );
    assert_eq!(
        (r1.unwrap(), r2.unwrap(), r3.unwrap(), r4.unwrap(), r5.unwrap()),
        (1, 2, 3, 4, 5)
    );
    assert_eq!(state.constructed.load(Ordering::SeqCst), 1);
    assert!(coordinator.is_cached("w1").await);
}

#[tokio::test]
async fn test_concurrent_get_or_create_constructs_once() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, state) = setup(dir.path());

    // Construction has artificial latency; both callers race into it.
    let (a, b) = tokio::join!(
        coordinator.get_or_create("w1"),
        coordinator.get_or_create("w1"),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(state.constructed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hanging_operation_times_out_and_cleans_locks() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _state) = setup(dir.path());
    let lock_dir = dir.path().join("db");

    let started = Instant::now();
    let result = coordinator
        .execute("w1", |_rt| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, ServiceError>(())
        })
        .await;

    match result {
        Err(ServiceError::Timeout { seconds }) => assert_eq!(seconds, 2),
        other => panic!("expected timeout, got {:?}", other.map(|_| ())),
    }
    // Settled at the configured ceiling, nowhere near the hang duration.
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!lock::marker_exists(&lock_dir, "w1"));
}

#[tokio::test]
async fn test_timed_out_entry_is_removed_from_queue() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _state) = setup(dir.path());

    // The first operation wedges the drain; the second times out while
    // still queued and must not linger there.
    let (r1, r2) = tokio::join!(
        coordinator.execute("w1", |_rt| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, ServiceError>(())
        }),
        coordinator.execute("w2", |_rt| async { Ok::<_, ServiceError>(()) }),
    );
    assert!(matches!(r1, Err(ServiceError::Timeout { .. })));
    assert!(matches!(r2, Err(ServiceError::Timeout { .. })));
    assert_eq!(coordinator.queue_len(), 0);
}

#[tokio::test]
async fn test_handle_evicted_after_lock_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _state) = setup(dir.path());

    // Warm the cache.
    coordinator
        .execute("w1", |_rt| async { Ok::<_, ServiceError>(()) })
        .await
        .unwrap();
    assert!(coordinator.is_cached("w1").await);

    let result = coordinator
        .execute("w1", |_rt| async {
            Err::<(), _>(ServiceError::LockContention { message: "vault db is locked".into() })
        })
        .await;
    assert!(matches!(result, Err(ServiceError::LockContention { .. })));

    // Eviction happens after the reply is delivered.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!coordinator.is_cached("w1").await);
}

#[tokio::test]
async fn test_failed_construction_is_retried_once() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, state) = setup(dir.path());
    state.fail_next_opens.store(1, Ordering::SeqCst);

    coordinator
        .execute("w1", |_rt| async { Ok::<_, ServiceError>(()) })
        .await
        .unwrap();
    assert_eq!(state.constructed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_eviction_forces_reconstruction() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, state) = setup(dir.path());

    coordinator
        .execute("w1", |_rt| async { Ok::<_, ServiceError>(()) })
        .await
        .unwrap();
    coordinator.evict("w1").await;
    assert!(!coordinator.is_cached("w1").await);

    coordinator
        .execute("w1", |_rt| async { Ok::<_, ServiceError>(()) })
        .await
        .unwrap();
    assert_eq!(state.constructed.load(Ordering::SeqCst), 2);
}
