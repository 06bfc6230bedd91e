//! Connection pool implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::factory::ConnectionFactory;
use crate::lease::PooledConnection;
use crate::metrics::{PoolMetrics, PoolStatus};
use crate::reclaim::Reclaimer;
use crate::store::{Checkout, Store};

/// Connection type produced by a factory.
type Conn<F> = <F as ConnectionFactory>::Connection;

/// A bounded pool of reusable connections.
///
/// The pool opens `min_connections` connections up front and grows on
/// demand up to `max_connections`. It never makes a caller wait: [`get`]
/// either serves a connection immediately or fails with
/// [`PoolError::PoolExhausted`], leaving backoff to the caller. Overflow
/// connections (those beyond the minimum) are closed by a background task
/// once they have been outstanding for `reclaim_threshold` consecutive
/// `reclaim_interval`s.
///
/// `Pool` is a cheap handle; clones share the same pool. Dropping the last
/// handle closes the pool.
///
/// [`get`]: Pool::get
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

struct PoolInner<F: ConnectionFactory> {
    config: PoolConfig,
    factory: F,
    store: Arc<Store<Conn<F>>>,
    shutdown: CancellationToken,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a pool and fill it with `min_connections` connections.
    ///
    /// Must be called within a tokio runtime; the reclaimer is spawned on it.
    /// If any connection of the initial fill fails, the connections opened so
    /// far are closed and [`PoolError::InitialFill`] is returned.
    pub async fn new(config: PoolConfig, factory: F) -> Result<Self, PoolError> {
        config.validate()?;

        let store = Arc::new(Store::new(config.min_connections, config.max_connections));
        for created in 0..config.min_connections {
            match factory.connect().await {
                Ok(conn) => store.prefill(conn),
                Err(source) => {
                    store.metrics.record_connect_failure();
                    store.close();
                    tracing::debug!(created, error = %source, "initial fill failed");
                    return Err(PoolError::InitialFill { created, source });
                }
            }
        }

        let shutdown = CancellationToken::new();
        if !config.reclaim_interval.is_zero() {
            Reclaimer::new(
                Arc::clone(&store),
                config.reclaim_interval,
                config.reclaim_threshold,
                shutdown.clone(),
            )
            .spawn();
        }

        tracing::info!(
            min = config.min_connections,
            max = config.max_connections,
            "connection pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                store,
                shutdown,
            }),
        })
    }

    /// Get a connection from the pool.
    ///
    /// Serves an idle connection if there is one, otherwise opens a new one
    /// if the pool is below its maximum. Never waits for a connection to be
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`PoolError::PoolClosed`] if the pool has been closed.
    /// - [`PoolError::PoolExhausted`] if the maximum is reached and nothing
    ///   is idle.
    /// - [`PoolError::Connect`] with the factory's error, unchanged, if a new
    ///   connection could not be opened.
    pub async fn get(&self) -> Result<PooledConnection<Conn<F>>, PoolError> {
        let store = &self.inner.store;
        match store.checkout() {
            Checkout::Closed => Err(PoolError::PoolClosed),
            Checkout::Exhausted => {
                store.metrics.record_exhausted();
                tracing::debug!(
                    max = self.inner.config.max_connections,
                    "connection pool exhausted"
                );
                Err(PoolError::PoolExhausted {
                    max: self.inner.config.max_connections,
                })
            }
            Checkout::Idle(entry) => {
                tracing::trace!(id = entry.meta.id, "acquired idle connection");
                Ok(PooledConnection::new(entry, Arc::clone(store)))
            }
            Checkout::Grow(reservation) => {
                let conn = match self.inner.factory.connect().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        store.metrics.record_connect_failure();
                        tracing::debug!(error = %e, "failed to open connection");
                        return Err(PoolError::Connect(e));
                    }
                };
                match reservation.commit(conn) {
                    Ok(entry) => {
                        tracing::debug!(
                            id = entry.meta.id,
                            origin = ?entry.meta.origin,
                            "opened new connection"
                        );
                        Ok(PooledConnection::new(entry, Arc::clone(store)))
                    }
                    Err(entry) => {
                        let _ = store.close_connection(entry);
                        Err(PoolError::PoolClosed)
                    }
                }
            }
        }
    }

    /// Number of idle connections; leased connections are not counted.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.store.size()
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.inner.store.status()
    }

    /// Get the pool's lifetime counters.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.store.metrics.snapshot()
    }

    /// Close the pool.
    ///
    /// Idle connections are closed and the reclaimer stopped. Further calls
    /// to [`get`](Pool::get) fail with [`PoolError::PoolClosed`]; leases still
    /// out are closed when they are released. Closing twice is harmless.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        if let Some(closed) = self.inner.store.close() {
            tracing::info!(closed, "connection pool closed");
        }
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.store.is_closed()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the connection factory.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }
}

impl<F: ConnectionFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(closed) = self.store.close() {
            tracing::debug!(closed, "connection pool dropped");
        }
    }
}

/// Builder for [`Pool`].
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the reclaimer interval. Zero disables reclamation.
    #[must_use]
    pub fn reclaim_interval(mut self, interval: Duration) -> Self {
        self.config.reclaim_interval = interval;
        self
    }

    /// Set the number of overflow observations tolerated before reclaiming.
    #[must_use]
    pub fn reclaim_threshold(mut self, ticks: u32) -> Self {
        self.config.reclaim_threshold = ticks;
        self
    }

    /// Get the configuration built so far.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Build the pool.
    pub async fn build<F: ConnectionFactory>(self, factory: F) -> Result<Pool<F>, PoolError> {
        Pool::new(self.config, factory).await
    }
}

impl From<PoolConfig> for PoolBuilder {
    fn from(config: PoolConfig) -> Self {
        Self { config }
    }
}
