use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Whole milliseconds in `d` for log fields, saturating at `u64::MAX`
#[inline]
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Per-method dispatch counters
///
/// All counters use relaxed atomics; readers get approximate but
/// monotonically increasing values without taking any lock.
#[derive(Debug, Default)]
pub struct MethodMetrics {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    throttled: AtomicU64,
    unauthenticated: AtomicU64,
    total_latency_ns: AtomicU64,
}

impl MethodMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self, latency: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub(crate) fn record_failure(&self, latency: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub(crate) fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unauthenticated(&self) {
        self.unauthenticated.fetch_add(1, Ordering::Relaxed);
    }

    fn add_latency(&self, latency: Duration) {
        let ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.total_latency_ns.fetch_add(ns, Ordering::Relaxed);
    }

    /// Calls that reached the method (including those later throttled or rejected)
    #[must_use]
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn succeeded_count(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Calls where some handler stage returned an error
    #[must_use]
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn throttled_count(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn unauthenticated_count(&self) -> u64 {
        self.unauthenticated.load(Ordering::Relaxed)
    }

    /// Mean handler-chain latency over completed calls
    ///
    /// Returns zero if no call has completed yet.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let completed = self.succeeded_count() + self.failed_count();
        if completed == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / completed)
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MethodMetricsSnapshot {
        MethodMetricsSnapshot {
            dispatched: self.dispatched_count(),
            succeeded: self.succeeded_count(),
            failed: self.failed_count(),
            throttled: self.throttled_count(),
            unauthenticated: self.unauthenticated_count(),
            average_latency_ns: u64::try_from(self.average_latency().as_nanos())
                .unwrap_or(u64::MAX),
        }
    }
}

/// Point-in-time copy of [`MethodMetrics`], serializable for status endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodMetricsSnapshot {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub throttled: u64,
    pub unauthenticated: u64,
    pub average_latency_ns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_zero() {
        let metrics = MethodMetrics::new();
        assert_eq!(metrics.dispatched_count(), 0);
        assert_eq!(metrics.average_latency(), Duration::from_nanos(0));
    }

    #[test]
    fn test_metrics_record() {
        let metrics = MethodMetrics::new();

        metrics.record_dispatch();
        metrics.record_success(Duration::from_nanos(100));
        metrics.record_dispatch();
        metrics.record_failure(Duration::from_nanos(300));
        metrics.record_dispatch();
        metrics.record_throttled();
        metrics.record_dispatch();
        metrics.record_unauthenticated();

        let snap = metrics.snapshot();
        assert_eq!(snap.dispatched, 4);
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.throttled, 1);
        assert_eq!(snap.unauthenticated, 1);
        assert_eq!(snap.average_latency_ns, 200);

        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["throttled"], 1);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
