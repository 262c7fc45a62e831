//! Metrics registry for the sigil registry
//!
//! - Counters are monotonic and reset only on process start
//! - `entries` is the one gauge: size of the published snapshot
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters
///
/// Uses Relaxed ordering; readers tolerate slightly stale values.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Inhale requests received (including krystal)
    inhale_requests: AtomicU64,
    /// Records that passed validation
    records_accepted: AtomicU64,
    /// Records rejected by validation
    records_rejected: AtomicU64,
    /// Accepted records that inserted or replaced an entry
    records_applied: AtomicU64,
    /// Successful commits
    commits: AtomicU64,
    /// Failed commits
    commit_failures: AtomicU64,
    /// Batches refused for size
    oversized_batches: AtomicU64,
    /// Entries dropped by the retention cap
    entries_pruned: AtomicU64,
    /// Entries in the published snapshot
    entries: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_inhale_requests(&self) {
        self.inhale_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the per-record outcome of one merged batch
    pub fn record_batch(&self, accepted: u64, rejected: u64, applied: u64) {
        self.records_accepted.fetch_add(accepted, Ordering::Relaxed);
        self.records_rejected.fetch_add(rejected, Ordering::Relaxed);
        self.records_applied.fetch_add(applied, Ordering::Relaxed);
    }

    pub fn increment_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commit_failures(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_oversized_batches(&self) {
        self.oversized_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_entries_pruned(&self, n: u64) {
        self.entries_pruned.fetch_add(n, Ordering::Relaxed);
    }

    /// Set published entry count
    pub fn set_entries(&self, count: u64) {
        self.entries.store(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            inhale_requests: self.inhale_requests.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            records_applied: self.records_applied.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            oversized_batches: self.oversized_batches.load(Ordering::Relaxed),
            entries_pruned: self.entries_pruned.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub inhale_requests: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    pub records_applied: u64,
    pub commits: u64,
    pub commit_failures: u64,
    pub oversized_batches: u64,
    pub entries_pruned: u64,
    pub entries: u64,
}
