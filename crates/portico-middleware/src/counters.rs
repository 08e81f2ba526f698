//! In-memory request counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Path key used when no route matched.
pub const UNMATCHED_PATH: &str = "<unmatched>";

/// Totals by route and by status.
///
/// Shared through an `Arc` between the counting stage and whatever exposes
/// the snapshot.
#[derive(Debug, Default)]
pub struct RequestCounters {
    total: AtomicU64,
    by_path: DashMap<String, u64>,
    by_status: DashMap<u16, u64>,
}

impl RequestCounters {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one completed request.
    pub fn record(&self, path: &str, status: u16) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.by_path.entry(path.to_string()).or_insert(0) += 1;
        *self.by_status.entry(status).or_insert(0) += 1;
    }

    /// Requests counted so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Count for a single route pattern.
    #[must_use]
    pub fn for_path(&self, path: &str) -> u64 {
        self.by_path.get(path).map_or(0, |c| *c)
    }

    /// Count for a single status code.
    #[must_use]
    pub fn for_status(&self, status: u16) -> u64 {
        self.by_status.get(&status).map_or(0, |c| *c)
    }

    /// Point-in-time copy with keys in sorted order.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.total(),
            by_path: self
                .by_path
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            by_status: self
                .by_status
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect(),
        }
    }
}

/// Serializable view of [`RequestCounters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    /// All requests.
    pub total: u64,
    /// By route pattern.
    pub by_path: BTreeMap<String, u64>,
    /// By status code.
    pub by_status: BTreeMap<u16, u64>,
}
