//! Routing outcome counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counts terminal routing outcomes since process start.
#[derive(Debug)]
pub struct RouterMetrics {
    forwarded: AtomicU64,
    blocked: AtomicU64,
    no_exit_nodes: AtomicU64,
    failed: AtomicU64,
    started_at: Instant,
}

impl Default for RouterMetrics {
    fn default() -> Self {
        RouterMetrics {
            forwarded: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            no_exit_nodes: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl RouterMetrics {
    pub fn new() -> Self {
        RouterMetrics::default()
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_exit_nodes(&self) {
        self.no_exit_nodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            no_exit_nodes: self.no_exit_nodes.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// Point-in-time copy of the counters, shaped for the `_info` admin op.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub forwarded: u64,
    pub blocked: u64,
    pub no_exit_nodes: u64,
    pub failed: u64,
    pub uptime_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = RouterMetrics::new();
        metrics.record_forwarded();
        metrics.record_forwarded();
        metrics.record_blocked();
        metrics.record_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.forwarded, 2);
        assert_eq!(snap.blocked, 1);
        assert_eq!(snap.no_exit_nodes, 0);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = RouterMetrics::new().snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("forwarded").is_some());
        assert!(json.get("uptime_ms").is_some());
    }
}
