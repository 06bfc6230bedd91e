//! Idle-capacity reclamation.
//!
//! A background task observes the pool on a fixed interval. Every
//! observation that finds overflow connections alive bumps a counter; once
//! the counter passes the configured threshold the overflow is closed and
//! the counter reset. Observations without overflow leave the counter alone.
//!
//! Only overflow-origin connections are closed. Leased overflow connections
//! are waited for: the task parks until a lease is returned, so callers of
//! `get` and `close` never wait on it. The task ends when the pool is closed
//! or its last handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::Connection;
use crate::store::{Store, Tick};

/// Background task shrinking overflow after sustained idleness.
pub(crate) struct Reclaimer<C> {
    store: Arc<Store<C>>,
    interval: Duration,
    threshold: u32,
    shutdown: CancellationToken,
}

impl<C: Connection> Reclaimer<C> {
    pub(crate) fn new(
        store: Arc<Store<C>>,
        interval: Duration,
        threshold: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            interval,
            threshold,
            shutdown,
        }
    }

    /// Spawn the reclaimer on the current tokio runtime.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.store.observe(self.threshold) {
                Tick::Closed => break,
                Tick::Quiet => {}
                Tick::Counting { ticks } => {
                    tracing::trace!(ticks, threshold = self.threshold, "overflow outstanding");
                }
                Tick::Reclaim { target } => {
                    if !self.reclaim(target).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!("reclaimer stopped");
    }

    /// Close `target` overflow connections.
    ///
    /// Returns `false` if the pool was closed before the cycle completed.
    async fn reclaim(&self, target: u32) -> bool {
        tracing::debug!(overflow = target, "reclaiming overflow connections");
        let mut remaining = target;

        loop {
            let Some((taken, overflow_left)) = self.store.take_idle_overflow(remaining) else {
                return false;
            };
            let count = taken.len() as u32;
            for entry in taken {
                let _ = self.store.close_connection(entry);
            }
            self.store.metrics.record_reclaimed(u64::from(count));
            remaining -= count;

            // Overflow closed elsewhere (discarded, or rejected by a full
            // buffer) no longer needs reclaiming.
            remaining = remaining.min(overflow_left);
            if remaining == 0 {
                break;
            }

            tracing::debug!(remaining, "waiting for leased overflow connections");
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = self.store.returned.notified() => {}
            }
        }

        self.store.finish_reclaim();
        self.store.metrics.record_reclaim_cycle();
        tracing::info!(
            reclaimed = target,
            idle = self.store.size(),
            "reclaimed overflow connections"
        );
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::store::{Checkout, Entry};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe(Arc<AtomicUsize>);

    impl Connection for Probe {
        fn close(&mut self) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn lease(store: &Store<Probe>, closes: &Arc<AtomicUsize>) -> Entry<Probe> {
        match store.checkout() {
            Checkout::Idle(entry) => entry,
            Checkout::Grow(reservation) => reservation
                .commit(Probe(closes.clone()))
                .ok()
                .unwrap(),
            _ => panic!("no capacity"),
        }
    }

    /// A store with `min` floor connections and `overflow` idle overflow ones.
    fn store_with_overflow(min: u32, overflow: u32) -> (Arc<Store<Probe>>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(Store::new(min, min + overflow + 2));
        for _ in 0..min {
            store.prefill(Probe(closes.clone()));
        }
        let leases: Vec<_> = (0..min + overflow)
            .map(|_| lease(&store, &closes))
            .collect();
        for entry in leases {
            store.release(Some(entry)).unwrap();
        }
        (store, closes)
    }

    fn reclaimer(store: &Arc<Store<Probe>>, token: &CancellationToken) -> Reclaimer<Probe> {
        Reclaimer::new(store.clone(), Duration::from_secs(30), 10, token.clone())
    }

    #[tokio::test]
    async fn test_reclaim_closes_idle_overflow() {
        let (store, closes) = store_with_overflow(2, 2);
        assert_eq!(store.size(), 4);

        let token = CancellationToken::new();
        assert!(reclaimer(&store, &token).reclaim(2).await);

        let status = store.status();
        assert_eq!(store.size(), 2);
        assert_eq!(status.overflow, 0);
        assert_eq!(status.reclaim_ticks, 0);
        assert_eq!(closes.load(Ordering::SeqCst), 2);

        let metrics = store.metrics.snapshot();
        assert_eq!(metrics.reclaimed, 2);
        assert_eq!(metrics.reclaim_cycles, 1);
    }

    #[tokio::test]
    async fn test_reclaim_waits_for_leased_overflow() {
        let (store, closes) = store_with_overflow(1, 1);
        // Lease both: the floor connection comes out first, then the overflow.
        let floor = lease(&store, &closes);
        let overflow = lease(&store, &closes);
        assert!(overflow.meta.origin.is_overflow());

        let token = CancellationToken::new();
        let task = tokio::spawn(reclaimer(&store, &token).reclaim_owned(1));
        tokio::task::yield_now().await;
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        store.release(Some(floor)).unwrap();
        store.release(Some(overflow)).unwrap();
        assert!(task.await.unwrap());

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(store.size(), 1);
        assert_eq!(store.status().overflow, 0);
    }

    #[tokio::test]
    async fn test_reclaim_stops_when_overflow_discarded() {
        let (store, closes) = store_with_overflow(0, 1);
        let overflow = lease(&store, &closes);

        let token = CancellationToken::new();
        let task = tokio::spawn(reclaimer(&store, &token).reclaim_owned(1));
        tokio::task::yield_now().await;

        store.discard(overflow).unwrap();
        assert!(task.await.unwrap());
        assert_eq!(store.metrics.snapshot().reclaimed, 0);
    }

    #[tokio::test]
    async fn test_reclaim_cancelled_by_shutdown() {
        let (store, closes) = store_with_overflow(0, 1);
        let _overflow = lease(&store, &closes);

        let token = CancellationToken::new();
        let task = tokio::spawn(reclaimer(&store, &token).reclaim_owned(1));
        tokio::task::yield_now().await;

        token.cancel();
        assert!(!task.await.unwrap());
        assert_eq!(store.metrics.snapshot().reclaim_cycles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reclaims_after_threshold() {
        let (store, closes) = store_with_overflow(2, 2);
        let token = CancellationToken::new();
        let handle = reclaimer(&store, &token).spawn();

        // Ten observations are tolerated; the eleventh reclaims.
        tokio::time::sleep(Duration::from_secs(30 * 10 + 1)).await;
        assert_eq!(store.status().reclaim_ticks, 10);
        assert_eq!(store.size(), 4);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.size(), 2);
        assert_eq!(store.status().reclaim_ticks, 0);
        assert_eq!(closes.load(Ordering::SeqCst), 2);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_store_closed() {
        let (store, _closes) = store_with_overflow(1, 0);
        let token = CancellationToken::new();
        let handle = reclaimer(&store, &token).spawn();

        store.close();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(handle.is_finished());
    }

    impl Reclaimer<Probe> {
        async fn reclaim_owned(self, target: u32) -> bool {
            self.reclaim(target).await
        }
    }
}
