//! Pool status and lifetime counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the pool's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Idle connections ready to be leased.
    pub idle: u32,
    /// Connections currently leased.
    pub active: u32,
    /// Live connections created beyond the minimum.
    pub overflow: u32,
    /// Configured minimum.
    pub min: u32,
    /// Configured maximum.
    pub max: u32,
    /// Consecutive reclaimer observations that found overflow outstanding.
    pub reclaim_ticks: u32,
    /// Whether the pool has been closed.
    pub closed: bool,
}

impl PoolStatus {
    /// Idle plus leased connections.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.idle + self.active
    }

    /// Fraction of the ceiling currently leased, from 0.0 to 1.0.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            0.0
        } else {
            f64::from(self.active) / f64::from(self.max)
        }
    }

    /// Whether no further connection can be leased right now.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.idle == 0 && self.total() >= self.max
    }
}

/// Lifetime counters for a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Connections opened through the factory.
    pub connections_created: u64,
    /// Connections closed by the pool.
    pub connections_closed: u64,
    /// Factory calls that failed.
    pub connect_failures: u64,
    /// Successful checkouts.
    pub checkouts: u64,
    /// Checkouts rejected because the pool was at its ceiling.
    pub exhausted: u64,
    /// Overflow connections closed by the reclaimer.
    pub reclaimed: u64,
    /// Completed reclaim cycles.
    pub reclaim_cycles: u64,
    /// Connection close hooks that returned an error.
    pub close_failures: u64,
}

impl PoolMetrics {
    /// Fraction of checkout attempts that were served, from 0.0 to 1.0.
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let attempts = self.checkouts + self.exhausted + self.connect_failures;
        if attempts == 0 {
            1.0
        } else {
            self.checkouts as f64 / attempts as f64
        }
    }
}

/// Atomic counters backing [`PoolMetrics`].
#[derive(Debug, Default)]
pub(crate) struct AtomicPoolMetrics {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    connect_failures: AtomicU64,
    checkouts: AtomicU64,
    exhausted: AtomicU64,
    reclaimed: AtomicU64,
    reclaim_cycles: AtomicU64,
    close_failures: AtomicU64,
}

impl AtomicPoolMetrics {
    pub(crate) fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkout(&self) {
        self.checkouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaimed(&self, count: u64) {
        self.reclaimed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaim_cycle(&self) {
        self.reclaim_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close_failure(&self) {
        self.close_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            checkouts: self.checkouts.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            reclaim_cycles: self.reclaim_cycles.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_totals() {
        let status = PoolStatus {
            idle: 2,
            active: 6,
            overflow: 3,
            min: 5,
            max: 8,
            reclaim_ticks: 0,
            closed: false,
        };

        assert_eq!(status.total(), 8);
        assert!((status.utilization() - 0.75).abs() < 0.001);
        assert!(!status.is_exhausted());

        // No idle connections, but two slots of headroom remain.
        let drained = PoolStatus { idle: 0, ..status };
        assert!(!drained.is_exhausted());
    }

    #[test]
    fn test_status_exhausted() {
        let status = PoolStatus {
            idle: 0,
            active: 4,
            overflow: 2,
            min: 2,
            max: 4,
            reclaim_ticks: 3,
            closed: false,
        };
        assert!(status.is_exhausted());
        assert!((status.utilization() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_atomic_metrics_snapshot() {
        let metrics = AtomicPoolMetrics::default();

        metrics.record_created();
        metrics.record_created();
        metrics.record_checkout();
        metrics.record_checkout();
        metrics.record_checkout();
        metrics.record_exhausted();
        metrics.record_closed();
        metrics.record_reclaimed(2);
        metrics.record_reclaim_cycle();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_created, 2);
        assert_eq!(snapshot.connections_closed, 1);
        assert_eq!(snapshot.checkouts, 3);
        assert_eq!(snapshot.exhausted, 1);
        assert_eq!(snapshot.reclaimed, 2);
        assert_eq!(snapshot.reclaim_cycles, 1);
        assert!((snapshot.checkout_success_rate() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_success_rate_without_attempts() {
        assert!((PoolMetrics::default().checkout_success_rate() - 1.0).abs() < 0.001);
    }
}
