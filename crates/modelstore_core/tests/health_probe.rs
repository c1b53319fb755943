use modelstore_core::{
    HealthMonitor, HealthProbe, HealthStatus, ModelRepository, RepositoryConfig,
    SqliteVersionedStore, StoreHealth,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

struct SlowProbe(Duration);

impl HealthProbe for SlowProbe {
    fn health(&self) -> StoreHealth {
        thread::sleep(self.0);
        StoreHealth::up()
    }
}

/// Blocks until released and counts how often the store was asked.
#[derive(Default)]
struct StuckStore {
    calls: AtomicUsize,
    gate: Mutex<()>,
}

impl HealthProbe for StuckStore {
    fn health(&self) -> StoreHealth {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _open = self.gate.lock().unwrap();
        StoreHealth::up()
    }
}

struct UnreachableProbe;

impl HealthProbe for UnreachableProbe {
    fn health(&self) -> StoreHealth {
        StoreHealth::down("connection refused")
    }
}

struct PanickingProbe;

impl HealthProbe for PanickingProbe {
    fn health(&self) -> StoreHealth {
        panic!("probe exploded");
    }
}

#[test]
fn absent_store_is_reported_down() {
    let report = HealthMonitor::new(None, Duration::from_millis(100)).health();
    assert_eq!(report.status, HealthStatus::Down);
    assert_eq!(
        report.details.get("cause").map(String::as_str),
        Some("store not configured")
    );
}

#[test]
fn store_that_failed_to_open_keeps_its_cause() {
    let monitor = HealthMonitor::without_store(
        "store could not be opened: unable to open database file",
        Duration::from_millis(100),
    );
    let report = monitor.health();
    assert_eq!(report.status, HealthStatus::Down);
    assert_eq!(
        report.details["cause"],
        "store could not be opened: unable to open database file"
    );
}

#[test]
fn stuck_store_gets_one_thread_at_a_time() {
    let store = Arc::new(StuckStore::default());
    let gate = store.gate.lock().unwrap();
    let probe: Arc<dyn HealthProbe> = store.clone();
    let monitor = HealthMonitor::new(Some(probe), Duration::from_millis(50));

    let first = monitor.health();
    assert!(first.details["cause"].contains("50 ms"));

    for _ in 0..5 {
        let again = monitor.clone().health();
        assert_eq!(again.status, HealthStatus::Down);
        assert_eq!(again.details["cause"], "previous health check still running");
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);

    drop(gate);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let report = monitor.health();
        if report.is_up() {
            break;
        }
        assert!(Instant::now() < deadline, "store never recovered: {report:?}");
        thread::sleep(Duration::from_millis(10));
    }
    assert!(store.calls.load(Ordering::SeqCst) >= 2);
}

#[test]
fn slow_store_is_down_within_timeout() {
    let timeout = Duration::from_millis(100);
    let monitor = HealthMonitor::new(Some(Arc::new(SlowProbe(Duration::from_secs(5)))), timeout);

    let started_at = Instant::now();
    let report = monitor.health();
    let elapsed = started_at.elapsed();

    assert_eq!(report.status, HealthStatus::Down);
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    assert!(report.details["cause"].contains("100 ms"));
}

#[test]
fn unreachable_store_cause_is_kept() {
    let monitor = HealthMonitor::new(Some(Arc::new(UnreachableProbe)), Duration::from_secs(1));
    let report = monitor.health();
    assert!(!report.is_up());
    assert_eq!(report.details["cause"], "connection refused");
}

#[test]
fn panicking_probe_is_down_not_a_panic() {
    let monitor = HealthMonitor::new(Some(Arc::new(PanickingProbe)), Duration::from_secs(1));
    let report = monitor.health();
    assert_eq!(report.status, HealthStatus::Down);
    assert_eq!(report.details["cause"], "store health probe failed");
}

#[test]
fn sqlite_store_is_up_through_repository_monitor() {
    let repo = ModelRepository::new(
        Arc::new(SqliteVersionedStore::open_in_memory().unwrap()),
        RepositoryConfig::default(),
    );
    let report = repo.health_monitor(Duration::from_secs(1)).health();
    assert!(report.is_up());
    assert_eq!(report.details["backend"], "sqlite");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "UP");
}
