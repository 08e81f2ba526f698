//! Liveness and readiness probes.
//!
//! [`HealthCheck`] answers "is the process up", [`ReadinessCheck`] answers
//! "should traffic be sent here". Readiness turns false as soon as shutdown
//! begins, and whenever a registered check fails.
//!
//! ```
//! use portico_server::{HealthCheck, ReadinessCheck};
//!
//! let health = HealthCheck::new("portico", "0.1.0");
//! assert_eq!(health.status().status(), "healthy");
//!
//! let readiness = ReadinessCheck::new().add_check("api", || true);
//! assert!(readiness.is_ready());
//! readiness.set_ready(false);
//! assert!(!readiness.status().is_ready());
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Body of the liveness probe.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    status: &'static str,
    service: String,
    version: String,
    uptime_seconds: u64,
    timestamp: DateTime<Utc>,
}

impl HealthStatus {
    /// `"healthy"` while the process runs.
    #[must_use]
    pub fn status(&self) -> &str {
        self.status
    }

    /// Service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whole seconds since start.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.uptime_seconds
    }
}

/// Liveness probe.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    started: Instant,
}

impl HealthCheck {
    /// Starts the uptime clock now.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            started: Instant::now(),
        }
    }

    /// Time since construction.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// The current liveness body.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            service: self.service.clone(),
            version: self.version.clone(),
            uptime_seconds: self.uptime().as_secs(),
            timestamp: Utc::now(),
        }
    }
}

/// Body of the readiness probe.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadinessStatus {
    ready: bool,
    checks: BTreeMap<String, bool>,
    timestamp: DateTime<Utc>,
}

impl ReadinessStatus {
    /// Whether every check passed and shutdown has not begun.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Result of one named check.
    #[must_use]
    pub fn check(&self, name: &str) -> Option<bool> {
        self.checks.get(name).copied()
    }

    /// All check results by name.
    #[must_use]
    pub fn checks(&self) -> &BTreeMap<String, bool> {
        &self.checks
    }
}

type CheckFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Readiness probe with named checks.
///
/// Clones share the ready flag, so the server can flip it off while the
/// handler holding another clone keeps reporting.
#[derive(Clone)]
pub struct ReadinessCheck {
    checks: Vec<(String, CheckFn)>,
    accepting: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReadinessCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessCheck")
            .field("checks", &self.checks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("accepting", &self.accepting.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for ReadinessCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessCheck {
    /// Ready, with no checks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Adds a named check; `check` returns `true` when its dependency is usable.
    #[must_use]
    pub fn add_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.push((name.into(), Arc::new(check)));
        self
    }

    /// Flips the shared ready flag.
    pub fn set_ready(&self, ready: bool) {
        self.accepting.store(ready, Ordering::SeqCst);
    }

    /// Whether the flag is set and every check passes.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) && self.checks.iter().all(|(_, check)| check())
    }

    /// Runs every check and reports the results.
    #[must_use]
    pub fn status(&self) -> ReadinessStatus {
        let checks: BTreeMap<String, bool> = self
            .checks
            .iter()
            .map(|(name, check)| (name.clone(), check()))
            .collect();
        let ready = self.accepting.load(Ordering::SeqCst) && checks.values().all(|ok| *ok);
        ReadinessStatus {
            ready,
            checks,
            timestamp: Utc::now(),
        }
    }
}
