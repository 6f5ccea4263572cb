//! Dispatch counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters maintained by the hook dispatcher.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Total dispatches
    dispatches: AtomicU64,
    /// Total conflicting pairs reported
    conflicts: AtomicU64,
    /// Total plugin invocations that errored, panicked or timed out
    invocation_failures: AtomicU64,
    /// Subset of failures caused by the invocation timeout
    timeouts: AtomicU64,
    /// Typed calls whose aggregate did not convert
    type_mismatches: AtomicU64,
}

impl DispatchMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn dispatched(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn conflicted(&self, pairs: u64) {
        self.conflicts.fetch_add(pairs, Ordering::Relaxed);
    }

    pub(crate) fn invocation_failed(&self) {
        self.invocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timed_out(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn type_mismatched(&self) {
        self.type_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            invocation_failures: self.invocation_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            type_mismatches: self.type_mismatches.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMetricsSnapshot {
    /// Total dispatches
    pub dispatches: u64,
    /// Total conflicting pairs reported
    pub conflicts: u64,
    /// Total failed plugin invocations
    pub invocation_failures: u64,
    /// Invocations cut off by the timeout
    pub timeouts: u64,
    /// Typed-call conversion failures
    pub type_mismatches: u64,
}
