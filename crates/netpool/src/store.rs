//! Bounded store of idle connections and the pool's accounting.
//!
//! Every state transition (checkout, growth, release, close, reclaim) goes
//! through one mutex guarding both the idle buffer and the counters, so
//! `idle + active <= max` holds at every observation point. The lock is never
//! held across an `.await` and connections are always closed after it is
//! released.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::PoolError;
use crate::lifecycle::{Connection, ConnectionMetadata, ConnectionOrigin};
use crate::metrics::{AtomicPoolMetrics, PoolStatus};

/// A connection together with the metadata the pool keeps for it.
pub(crate) struct Entry<C> {
    pub(crate) conn: C,
    pub(crate) meta: ConnectionMetadata,
}

/// Mutable pool state, guarded by the store mutex.
pub(crate) struct StoreState<C> {
    /// Idle buffer; `None` once the pool is closed.
    idle: Option<VecDeque<Entry<C>>>,
    /// Live floor-origin connections (idle or leased).
    floor_live: u32,
    /// Live overflow-origin connections (idle or leased).
    overflow: u32,
    /// Slots reserved for factory calls in flight.
    pending: u32,
    /// Leased connections.
    active: u32,
    /// Consecutive reclaimer observations with overflow outstanding.
    idle_ticks: u32,
}

impl<C> StoreState<C> {
    fn new(max: u32) -> Self {
        Self {
            idle: Some(VecDeque::with_capacity(max as usize)),
            floor_live: 0,
            overflow: 0,
            pending: 0,
            active: 0,
            idle_ticks: 0,
        }
    }

    fn live(&self) -> u32 {
        self.floor_live + self.overflow
    }

    fn idle_len(&self) -> u32 {
        self.idle.as_ref().map_or(0, |idle| idle.len() as u32)
    }

    /// Drop a connection of `origin` from the live counts.
    fn forget(&mut self, origin: ConnectionOrigin) {
        match origin {
            ConnectionOrigin::Floor => self.floor_live = self.floor_live.saturating_sub(1),
            ConnectionOrigin::Overflow => self.overflow = self.overflow.saturating_sub(1),
        }
    }

    /// Push `entry` into the idle buffer if it is open and has room.
    fn try_store(&mut self, entry: Entry<C>, max: u32) -> Result<(), Entry<C>> {
        match self.idle.as_mut() {
            Some(idle) if idle.len() < max as usize => {
                idle.push_back(entry);
                Ok(())
            }
            _ => Err(entry),
        }
    }

    /// One reclaimer observation.
    pub(crate) fn observe(&mut self, threshold: u32) -> Tick {
        if self.idle.is_none() {
            return Tick::Closed;
        }
        if self.overflow == 0 {
            return Tick::Quiet;
        }
        self.idle_ticks += 1;
        if self.idle_ticks > threshold {
            Tick::Reclaim {
                target: self.overflow,
            }
        } else {
            Tick::Counting {
                ticks: self.idle_ticks,
            }
        }
    }
}

/// Outcome of a reclaimer observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    /// The pool is closed.
    Closed,
    /// No overflow outstanding; the tick count is left as is.
    Quiet,
    /// Overflow outstanding, threshold not yet passed.
    Counting { ticks: u32 },
    /// Threshold passed; `target` overflow connections should be closed.
    Reclaim { target: u32 },
}

/// Outcome of [`Store::checkout`].
pub(crate) enum Checkout<'a, C: Connection> {
    /// An idle connection was leased.
    Idle(Entry<C>),
    /// No idle connection; a slot below the ceiling was reserved for a new one.
    Grow(Reservation<'a, C>),
    /// The pool is closed.
    Closed,
    /// The ceiling is reached and nothing is idle.
    Exhausted,
}

/// A slot reserved for a connection the factory is opening.
///
/// Dropping the reservation without committing (factory failure, or the
/// acquiring future being cancelled) gives the slot back.
pub(crate) struct Reservation<'a, C: Connection> {
    store: &'a Store<C>,
    armed: bool,
}

impl<C: Connection> Reservation<'_, C> {
    /// Account for the freshly opened `conn` as a leased connection.
    ///
    /// Returns the entry back as `Err` if the pool was closed while the
    /// factory ran; the caller must close it.
    pub(crate) fn commit(mut self, conn: C) -> Result<Entry<C>, Entry<C>> {
        self.armed = false;
        let store = self.store;
        store.metrics.record_created();

        let mut guard = store.state.lock();
        let state = &mut *guard;
        state.pending = state.pending.saturating_sub(1);

        let origin = if state.floor_live < store.min {
            ConnectionOrigin::Floor
        } else {
            ConnectionOrigin::Overflow
        };
        let mut entry = Entry {
            conn,
            meta: ConnectionMetadata::new(store.next_id(), origin),
        };
        if state.idle.is_none() {
            return Err(entry);
        }

        match origin {
            ConnectionOrigin::Floor => state.floor_live += 1,
            ConnectionOrigin::Overflow => state.overflow += 1,
        }
        state.active += 1;
        drop(guard);

        entry.meta.mark_checkout();
        store.metrics.record_checkout();
        Ok(entry)
    }
}

impl<C: Connection> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.store.state.lock();
            state.pending = state.pending.saturating_sub(1);
        }
    }
}

/// The pool's shared core: idle buffer, counters, metrics.
pub(crate) struct Store<C> {
    min: u32,
    max: u32,
    state: Mutex<StoreState<C>>,
    pub(crate) metrics: AtomicPoolMetrics,
    /// Signalled whenever an overflow connection is returned or dropped.
    pub(crate) returned: Notify,
    next_id: AtomicU64,
}

impl<C: Connection> Store<C> {
    pub(crate) fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            state: Mutex::new(StoreState::new(max)),
            metrics: AtomicPoolMetrics::default(),
            returned: Notify::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a floor connection opened while filling the pool.
    pub(crate) fn prefill(&self, conn: C) {
        self.metrics.record_created();
        let entry = Entry {
            conn,
            meta: ConnectionMetadata::new(self.next_id(), ConnectionOrigin::Floor),
        };

        let mut state = self.state.lock();
        match state.try_store(entry, self.max) {
            Ok(()) => state.floor_live += 1,
            Err(entry) => {
                drop(state);
                let _ = self.close_connection(entry);
            }
        }
    }

    /// Take an idle connection, or reserve room for a new one.
    pub(crate) fn checkout(&self) -> Checkout<'_, C> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(idle) = state.idle.as_mut() else {
            return Checkout::Closed;
        };
        if let Some(mut entry) = idle.pop_front() {
            state.active += 1;
            drop(guard);
            entry.meta.mark_checkout();
            self.metrics.record_checkout();
            return Checkout::Idle(entry);
        }

        if state.live() + state.pending < self.max {
            state.pending += 1;
            return Checkout::Grow(Reservation {
                store: self,
                armed: true,
            });
        }
        Checkout::Exhausted
    }

    /// Return a leased connection.
    ///
    /// The connection goes back to the idle buffer when the pool is open and
    /// the buffer has room; otherwise it is closed.
    pub(crate) fn release(&self, entry: Option<Entry<C>>) -> Result<(), PoolError> {
        let Some(mut entry) = entry else {
            return Err(PoolError::NoConnection);
        };
        let id = entry.meta.id;
        let origin = entry.meta.origin;
        entry.meta.mark_checkin();

        let rejected = {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            let closed = state.idle.is_none();
            match state.try_store(entry, self.max) {
                Ok(()) => None,
                Err(entry) => {
                    state.forget(origin);
                    Some((entry, closed))
                }
            }
        };

        if origin.is_overflow() {
            self.returned.notify_one();
        }

        match rejected {
            None => {
                tracing::trace!(id, "connection returned to pool");
                Ok(())
            }
            Some((entry, closed)) => {
                if closed {
                    tracing::trace!(id, "pool closed, closing returned connection");
                } else {
                    tracing::debug!(id, "idle buffer full, closing returned connection");
                }
                self.close_connection(entry).map_err(PoolError::Close)
            }
        }
    }

    /// Remove a leased connection from the pool's accounting and close it.
    pub(crate) fn discard(&self, entry: Entry<C>) -> Result<(), PoolError> {
        self.forget_leased(entry.meta.origin);
        tracing::debug!(id = entry.meta.id, "discarding leased connection");
        self.close_connection(entry).map_err(PoolError::Close)
    }

    /// Remove a leased connection from the pool's accounting without closing it.
    pub(crate) fn detach(&self, entry: Entry<C>) -> C {
        self.forget_leased(entry.meta.origin);
        tracing::debug!(id = entry.meta.id, "detaching connection from pool");
        entry.conn
    }

    fn forget_leased(&self, origin: ConnectionOrigin) {
        {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            state.forget(origin);
        }
        if origin.is_overflow() {
            self.returned.notify_one();
        }
    }

    /// Close the pool: discard the idle buffer and close its connections.
    ///
    /// Returns the number of connections closed, or `None` if the pool was
    /// already closed.
    pub(crate) fn close(&self) -> Option<usize> {
        let drained = {
            let mut state = self.state.lock();
            let idle = state.idle.take()?;
            for entry in &idle {
                state.forget(entry.meta.origin);
            }
            state.idle_ticks = 0;
            idle
        };

        let count = drained.len();
        for entry in drained {
            let _ = self.close_connection(entry);
        }
        Some(count)
    }

    /// Run the close hook on a connection the pool is giving up on.
    pub(crate) fn close_connection(&self, mut entry: Entry<C>) -> io::Result<()> {
        let result = entry.conn.close();
        self.metrics.record_closed();
        if let Err(e) = &result {
            self.metrics.record_close_failure();
            tracing::debug!(id = entry.meta.id, error = %e, "failed to close connection");
        }
        result
    }

    /// One reclaimer observation.
    pub(crate) fn observe(&self, threshold: u32) -> Tick {
        self.state.lock().observe(threshold)
    }

    /// Remove up to `limit` overflow connections from the idle buffer.
    ///
    /// Returns the removed entries and the overflow connections still alive
    /// afterwards (all of them leased, or idle beyond `limit`), or `None` if
    /// the pool is closed.
    pub(crate) fn take_idle_overflow(&self, limit: u32) -> Option<(Vec<Entry<C>>, u32)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let idle = state.idle.as_mut()?;

        let mut taken = Vec::new();
        let mut i = 0;
        while i < idle.len() && (taken.len() as u32) < limit {
            if idle[i].meta.origin.is_overflow() {
                if let Some(entry) = idle.remove(i) {
                    taken.push(entry);
                }
            } else {
                i += 1;
            }
        }
        state.overflow = state.overflow.saturating_sub(taken.len() as u32);
        Some((taken, state.overflow))
    }

    /// Reset the observation count after a reclaim cycle.
    pub(crate) fn finish_reclaim(&self) {
        self.state.lock().idle_ticks = 0;
    }

    /// Number of idle connections.
    pub(crate) fn size(&self) -> usize {
        self.state.lock().idle_len() as usize
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().idle.is_none()
    }

    pub(crate) fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            idle: state.idle_len(),
            active: state.active,
            overflow: state.overflow,
            min: self.min,
            max: self.max,
            reclaim_ticks: state.idle_ticks,
            closed: state.idle.is_none(),
        }
    }
}
