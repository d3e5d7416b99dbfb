//! Commit and conflict metrics
//!
//! Lightweight, thread-safe counters shared by every database of a
//! [`DatabaseManager`](crate::database_manager::DatabaseManager).
//!
//! # Overview
//!
//! - Commit latencies with percentile calculations (p50, p95, p99)
//! - Read and write conflicts, counted separately so a caller can tell
//!   which kind of retry it is facing
//! - Structural violations raised while installing a commit
//! - Records and bytes appended to logs
//! - The most recent slow commits
//!
//! Counters are `AtomicU64` with relaxed ordering; only the latency
//! window and the slow commit list take a mutex.
//!
//! # Example
//!
//! ```
//! use sdb::metrics::Metrics;
//!
//! let metrics = Metrics::new();
//! metrics.record_commit("shop", 1_500, 3, 120);
//! metrics.record_read_conflict();
//!
//! let stats = metrics.snapshot();
//! assert_eq!(stats.commit_count, 1);
//! assert_eq!(stats.read_conflicts, 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

/// Number of commit latencies kept for percentiles.
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Only the most recent slow commits are kept.
const MAX_SLOW_COMMITS: usize = 10;

/// Default slow commit threshold in milliseconds.
pub const SLOW_COMMIT_THRESHOLD_MS: u64 = 100;

pub struct Metrics {
    commit_count: AtomicU64,
    rollback_count: AtomicU64,
    read_conflicts: AtomicU64,
    write_conflicts: AtomicU64,
    structural_violations: AtomicU64,
    records_appended: AtomicU64,
    bytes_appended: AtomicU64,

    /// Rolling window of recent commit latencies, in microseconds.
    latencies_us: Mutex<VecDeque<u64>>,
    latency_sum_us: AtomicU64,

    slow_threshold_us: u64,
    slow_commit_count: AtomicU64,
    slow_commits: Mutex<VecDeque<SlowCommit>>,

    started_at: Instant,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SlowCommit {
    pub database: String,
    pub duration_us: u64,
    pub records: u64,
    /// Milliseconds since the metrics were created.
    pub timestamp_ms: u64,
}

/// Point-in-time copy of all metrics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MetricsSnapshot {
    pub commit_count: u64,
    pub rollback_count: u64,
    pub read_conflicts: u64,
    pub write_conflicts: u64,
    pub structural_violations: u64,
    pub records_appended: u64,
    pub bytes_appended: u64,

    pub commit_p50_us: u64,
    pub commit_p95_us: u64,
    pub commit_p99_us: u64,
    pub commit_avg_us: u64,

    pub slow_commit_count: u64,
    pub recent_slow_commits: Vec<SlowCommit>,

    pub uptime_secs: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_slow_threshold(SLOW_COMMIT_THRESHOLD_MS)
    }

    pub fn with_slow_threshold(threshold_ms: u64) -> Self {
        Self {
            commit_count: AtomicU64::new(0),
            rollback_count: AtomicU64::new(0),
            read_conflicts: AtomicU64::new(0),
            write_conflicts: AtomicU64::new(0),
            structural_violations: AtomicU64::new(0),
            records_appended: AtomicU64::new(0),
            bytes_appended: AtomicU64::new(0),
            latencies_us: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            latency_sum_us: AtomicU64::new(0),
            slow_threshold_us: threshold_ms.saturating_mul(1000),
            slow_commit_count: AtomicU64::new(0),
            slow_commits: Mutex::new(VecDeque::with_capacity(MAX_SLOW_COMMITS)),
            started_at: Instant::now(),
        }
    }

    /// Record a successful commit. Returns true when it counted as slow.
    pub fn record_commit(&self, database: &str, duration_us: u64, records: u64, bytes: u64) -> bool {
        self.commit_count.fetch_add(1, Ordering::Relaxed);
        self.records_appended.fetch_add(records, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);

        {
            let mut latencies = self.latencies_us.lock().unwrap();
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                if let Some(old) = latencies.pop_front() {
                    self.latency_sum_us.fetch_sub(old, Ordering::Relaxed);
                }
            }
            latencies.push_back(duration_us);
            self.latency_sum_us.fetch_add(duration_us, Ordering::Relaxed);
        }

        if duration_us < self.slow_threshold_us {
            return false;
        }
        self.slow_commit_count.fetch_add(1, Ordering::Relaxed);
        let slow = SlowCommit {
            database: database.to_string(),
            duration_us,
            records,
            timestamp_ms: self.started_at.elapsed().as_millis() as u64,
        };
        let mut slow_commits = self.slow_commits.lock().unwrap();
        if slow_commits.len() >= MAX_SLOW_COMMITS {
            slow_commits.pop_front();
        }
        slow_commits.push_back(slow);
        true
    }

    pub fn record_rollback(&self) {
        self.rollback_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_conflict(&self) {
        self.read_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_structural_violation(&self) {
        self.structural_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Sorting the window is O(LATENCY_WINDOW_SIZE); only done here.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95, p99, avg) = {
            let latencies = self.latencies_us.lock().unwrap();
            if latencies.is_empty() {
                (0, 0, 0, 0)
            } else {
                let mut sorted: Vec<u64> = latencies.iter().copied().collect();
                sorted.sort_unstable();
                let len = sorted.len();
                let p99 = sorted
                    .get(len * 99 / 100)
                    .copied()
                    .unwrap_or(sorted[len - 1]);
                let avg = self.latency_sum_us.load(Ordering::Relaxed) / len as u64;
                (sorted[len * 50 / 100], sorted[len * 95 / 100], p99, avg)
            }
        };

        let recent_slow_commits = self.slow_commits.lock().unwrap().iter().cloned().collect();

        MetricsSnapshot {
            commit_count: self.commit_count.load(Ordering::Relaxed),
            rollback_count: self.rollback_count.load(Ordering::Relaxed),
            read_conflicts: self.read_conflicts.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
            structural_violations: self.structural_violations.load(Ordering::Relaxed),
            records_appended: self.records_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            commit_p50_us: p50,
            commit_p95_us: p95,
            commit_p99_us: p99,
            commit_avg_us: avg,
            slow_commit_count: self.slow_commit_count.load(Ordering::Relaxed),
            recent_slow_commits,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_new() {
        let snap = Metrics::new().snapshot();
        assert_eq!(snap.commit_count, 0);
        assert_eq!(snap.commit_p50_us, 0);
        assert_eq!(snap.commit_p99_us, 0);
        assert!(snap.recent_slow_commits.is_empty());
    }

    #[test]
    fn test_conflicts_counted_separately() {
        let m = Metrics::new();
        m.record_read_conflict();
        m.record_write_conflict();
        m.record_write_conflict();
        m.record_rollback();
        let snap = m.snapshot();
        assert_eq!(snap.read_conflicts, 1);
        assert_eq!(snap.write_conflicts, 2);
        assert_eq!(snap.rollback_count, 1);
        assert_eq!(snap.commit_count, 0);
    }

    #[test]
    fn test_commit_totals_accumulate() {
        let m = Metrics::new();
        m.record_commit("a", 10, 2, 40);
        m.record_commit("a", 30, 1, 15);
        let snap = m.snapshot();
        assert_eq!(snap.commit_count, 2);
        assert_eq!(snap.records_appended, 3);
        assert_eq!(snap.bytes_appended, 55);
        assert_eq!(snap.commit_avg_us, 20);
    }

    #[test]
    fn test_slow_commit_threshold_is_inclusive() {
        let m = Metrics::with_slow_threshold(1);
        assert!(!m.record_commit("a", 999, 1, 1));
        assert!(m.record_commit("a", 1000, 1, 1));
        let snap = m.snapshot();
        assert_eq!(snap.slow_commit_count, 1);
        assert_eq!(snap.recent_slow_commits[0].database, "a");
    }

    #[test]
    fn test_slow_commits_bounded() {
        let m = Metrics::with_slow_threshold(0);
        for i in 0..25 {
            m.record_commit("a", i, 1, 1);
        }
        let snap = m.snapshot();
        assert_eq!(snap.slow_commit_count, 25);
        assert_eq!(snap.recent_slow_commits.len(), MAX_SLOW_COMMITS);
        assert_eq!(snap.recent_slow_commits[0].duration_us, 15);
    }

    #[test]
    fn test_percentiles() {
        let m = Metrics::new();
        for i in 1..=100 {
            m.record_commit("a", i, 1, 1);
        }
        let snap = m.snapshot();
        assert_eq!(snap.commit_p50_us, 51);
        assert_eq!(snap.commit_p95_us, 96);
        assert_eq!(snap.commit_p99_us, 100);
    }

    #[test]
    fn test_latency_window_rolls() {
        let m = Metrics::new();
        for _ in 0..LATENCY_WINDOW_SIZE {
            m.record_commit("a", 1000, 1, 1);
        }
        for _ in 0..LATENCY_WINDOW_SIZE {
            m.record_commit("a", 10, 1, 1);
        }
        assert_eq!(m.snapshot().commit_avg_us, 10);
    }

    #[test]
    fn test_concurrent_recording() {
        let m = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_commit("a", 5, 1, 10);
                        m.record_write_conflict();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = m.snapshot();
        assert_eq!(snap.commit_count, 800);
        assert_eq!(snap.write_conflicts, 800);
        assert_eq!(snap.bytes_appended, 8000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let m = Metrics::new();
        m.record_commit("a", 5, 1, 10);
        let json = serde_json::to_string(&m.snapshot()).unwrap();
        assert!(json.contains("\"commit_count\":1"));
    }
}
