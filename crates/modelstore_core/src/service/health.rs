//! Store liveness reporting.
//!
//! # Responsibility
//! - Run the store adapter's health probe off the caller's thread.
//! - Convert every probe outcome, including absence and timeout, into a
//!   report.
//!
//! # Invariants
//! - `health()` never panics and never returns an error.
//! - `health()` returns within the configured timeout plus thread spawn cost.
//! - A probe stuck past the timeout is abandoned, not joined.
//! - At most one probe thread per monitor is alive at a time.

use crate::store::{HealthProbe, StoreHealth};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Coarse health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health report returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub details: BTreeMap<String, String>,
}

impl HealthReport {
    fn down(cause: impl Into<String>) -> Self {
        let mut details = BTreeMap::new();
        details.insert("cause".to_string(), cause.into());
        Self {
            status: HealthStatus::Down,
            details,
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

impl From<StoreHealth> for HealthReport {
    fn from(value: StoreHealth) -> Self {
        Self {
            status: if value.up {
                HealthStatus::Up
            } else {
                HealthStatus::Down
            },
            details: value.details,
        }
    }
}

/// Bounded-time health monitor over an optional store probe.
///
/// Clones share the in-flight flag, so a stuck probe blocks new probe
/// threads for every clone until it returns.
#[derive(Clone)]
pub struct HealthMonitor {
    probe: Option<Arc<dyn HealthProbe>>,
    absent_cause: String,
    timeout: Duration,
    in_flight: Arc<AtomicBool>,
}

impl HealthMonitor {
    /// `probe = None` models a deployment without a configured store.
    pub fn new(probe: Option<Arc<dyn HealthProbe>>, timeout: Duration) -> Self {
        Self::build(probe, "store not configured".to_string(), timeout, Arc::default())
    }

    /// Monitor for a store that could not be set up; always DOWN with `cause`.
    pub fn without_store(cause: impl Into<String>, timeout: Duration) -> Self {
        Self::build(None, cause.into(), timeout, Arc::default())
    }

    pub(crate) fn sharing_flag(
        probe: Arc<dyn HealthProbe>,
        timeout: Duration,
        in_flight: Arc<AtomicBool>,
    ) -> Self {
        Self::build(Some(probe), String::new(), timeout, in_flight)
    }

    fn build(
        probe: Option<Arc<dyn HealthProbe>>,
        absent_cause: String,
        timeout: Duration,
        in_flight: Arc<AtomicBool>,
    ) -> Self {
        Self {
            probe,
            absent_cause,
            timeout,
            in_flight,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn health(&self) -> HealthReport {
        let Some(probe) = self.probe.as_ref() else {
            warn!("event=health_probe module=health status=down reason=no_store");
            return HealthReport::down(self.absent_cause.clone());
        };

        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!("event=health_probe module=health status=down reason=still_running");
            return HealthReport::down("previous health check still running");
        }

        let started_at = Instant::now();
        let (sender, receiver) = mpsc::channel();
        let probe = Arc::clone(probe);
        let in_flight = Arc::clone(&self.in_flight);
        let spawned = thread::Builder::new()
            .name("modelstore-health".to_string())
            .spawn(move || {
                let release = InFlight(in_flight);
                let store_health = probe.health();
                // Cleared before sending so the caller never sees a stale flag.
                drop(release);
                // Receiver may be gone after a timeout.
                let _ = sender.send(store_health);
            });
        if let Err(err) = spawned {
            self.in_flight.store(false, Ordering::Release);
            warn!(
                "event=health_probe module=health status=error reason=spawn_failed error={}",
                err
            );
            return HealthReport::down("health probe could not be started");
        }

        let report = match receiver.recv_timeout(self.timeout) {
            Ok(store_health) => HealthReport::from(store_health),
            Err(RecvTimeoutError::Timeout) => HealthReport::down(format!(
                "store did not respond within {} ms",
                self.timeout.as_millis()
            )),
            Err(RecvTimeoutError::Disconnected) => HealthReport::down("store health probe failed"),
        };

        let status = if report.is_up() { "up" } else { "down" };
        if report.is_up() {
            info!(
                "event=health_probe module=health status={} duration_ms={}",
                status,
                started_at.elapsed().as_millis()
            );
        } else {
            warn!(
                "event=health_probe module=health status={} duration_ms={}",
                status,
                started_at.elapsed().as_millis()
            );
        }
        report
    }
}

/// Clears the in-flight flag when the probe thread ends, panics included.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("configured", &self.probe.is_some())
            .field("timeout", &self.timeout)
            .field("in_flight", &self.in_flight.load(Ordering::Acquire))
            .finish()
    }
}
