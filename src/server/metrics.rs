// src/server/metrics.rs
//! Server metrics tracking
//!
//! Plain atomic counters, exposed via the admin `/status/metrics`
//! endpoint. Same shape as the teacher's cache-hit-rate metrics, rebased
//! onto the counters this domain cares about: transfer volume, lock
//! contention, and transaction outcomes.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct ServerMetrics {
    requests_total: AtomicU64,
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    pushes_committed: AtomicU64,
    pulls_served: AtomicU64,
    transactions_rolled_back: AtomicU64,
    lock_contentions: AtomicU64,
    start_time: std::sync::OnceLock<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        let metrics = Self::default();
        let _ = metrics.start_time.set(Instant::now());
        metrics
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, bytes: u64) {
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
        self.pushes_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
        self.pulls_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_contention(&self) {
        self.lock_contentions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self
            .start_time
            .get()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);

        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_uploaded_human: human_bytes(self.bytes_uploaded.load(Ordering::Relaxed)),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            bytes_downloaded_human: human_bytes(self.bytes_downloaded.load(Ordering::Relaxed)),
            pushes_committed: self.pushes_committed.load(Ordering::Relaxed),
            pulls_served: self.pulls_served.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            lock_contentions: self.lock_contentions.load(Ordering::Relaxed),
            uptime_secs: uptime.as_secs(),
        }
    }

    #[cfg(test)]
    pub fn reset(&self) {
        self.requests_total.store(0, Ordering::Relaxed);
        self.bytes_uploaded.store(0, Ordering::Relaxed);
        self.bytes_downloaded.store(0, Ordering::Relaxed);
        self.pushes_committed.store(0, Ordering::Relaxed);
        self.pulls_served.store(0, Ordering::Relaxed);
        self.transactions_rolled_back.store(0, Ordering::Relaxed);
        self.lock_contentions.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub bytes_uploaded: u64,
    pub bytes_uploaded_human: String,
    pub bytes_downloaded: u64,
    pub bytes_downloaded_human: String,
    pub pushes_committed: u64,
    pub pulls_served: u64,
    pub transactions_rolled_back: u64,
    pub lock_contentions: u64,
    pub uptime_secs: u64,
}

fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_basic() {
        let metrics = ServerMetrics::new();
        metrics.record_upload(2048);
        metrics.record_download(1024);
        metrics.record_lock_contention();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pushes_committed, 1);
        assert_eq!(snapshot.pulls_served, 1);
        assert_eq!(snapshot.bytes_uploaded, 2048);
        assert_eq!(snapshot.lock_contentions, 1);
        assert_eq!(snapshot.bytes_uploaded_human, "2.00 KB");
    }

    #[test]
    fn test_uptime_starts_at_zero() {
        let metrics = ServerMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.transactions_rolled_back, 0);
        assert!(snapshot.uptime_secs < 5);
    }
}
