//! Connection lifecycle management.
//!
//! This module defines the trait a pooled connection implements and the
//! metadata the pool tracks for every connection it owns.

use std::io;
use std::time::{Duration, Instant};

/// A connection that can be stored in the pool.
///
/// The pool calls [`close`](Connection::close) exactly once before it drops a
/// connection for good: when the pool is closed, when the idle buffer has no
/// room, when the reclaimer shrinks overflow, or when a lease is discarded.
/// Connections that are simply returned to the pool are never closed.
pub trait Connection: Send + 'static {
    /// Release transport resources.
    ///
    /// The default does nothing and lets `Drop` tear the connection down,
    /// which is how tokio sockets close.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for tokio::net::TcpStream {}

#[cfg(unix)]
impl Connection for tokio::net::UnixStream {}

impl Connection for tokio::io::DuplexStream {}

/// Why a connection was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionOrigin {
    /// Part of the configured minimum.
    Floor,
    /// Created beyond the minimum to satisfy demand; subject to reclamation.
    Overflow,
}

impl ConnectionOrigin {
    /// Check if the connection counts as overflow.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow)
    }
}

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Unique identifier for this connection within its pool.
    pub id: u64,
    /// Why the connection was created.
    pub origin: ConnectionOrigin,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection.
    pub fn new(id: u64, origin: ConnectionOrigin) -> Self {
        let now = Instant::now();
        Self {
            id,
            origin,
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
        }
    }

    /// Time since the connection was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the connection was last checked out or returned.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Mark the connection as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
    }

    /// Mark the connection as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Plain;

    impl Connection for Plain {}

    #[test]
    fn test_default_close_is_noop() {
        let mut conn = Plain;
        assert!(conn.close().is_ok());
    }

    #[test]
    fn test_origin_overflow() {
        assert!(ConnectionOrigin::Overflow.is_overflow());
        assert!(!ConnectionOrigin::Floor.is_overflow());
    }

    #[test]
    fn test_connection_metadata_new() {
        let meta = ConnectionMetadata::new(7, ConnectionOrigin::Floor);
        assert_eq!(meta.id, 7);
        assert_eq!(meta.origin, ConnectionOrigin::Floor);
        assert_eq!(meta.checkout_count, 0);
    }

    #[test]
    fn test_connection_metadata_checkout_checkin() {
        let mut meta = ConnectionMetadata::new(1, ConnectionOrigin::Overflow);
        meta.mark_checkout();
        meta.mark_checkin();
        meta.mark_checkout();

        assert_eq!(meta.checkout_count, 2);
        assert!(meta.last_used_at >= meta.created_at);
        assert!(meta.age() >= meta.idle_for());
    }
}
