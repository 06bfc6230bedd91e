//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Default interval between reclaimer observations.
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of consecutive overflow observations tolerated before
/// overflow connections are reclaimed (about five minutes at the default
/// interval).
pub const DEFAULT_RECLAIM_THRESHOLD: u32 = 10;

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Number of connections opened at construction and kept as the floor.
    pub min_connections: u32,

    /// Hard ceiling on idle plus leased connections.
    pub max_connections: u32,

    /// Interval between reclaimer observations.
    ///
    /// A zero interval disables the reclaimer; overflow connections are then
    /// kept until the pool is closed.
    pub reclaim_interval: Duration,

    /// Consecutive observations with overflow outstanding after which the
    /// overflow is closed. Reclamation happens on the observation that
    /// pushes the count past this value.
    pub reclaim_threshold: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            reclaim_interval: DEFAULT_RECLAIM_INTERVAL,
            reclaim_threshold: DEFAULT_RECLAIM_THRESHOLD,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the reclaimer interval.
    #[must_use]
    pub fn reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    /// Set the number of overflow observations tolerated before reclaiming.
    #[must_use]
    pub fn reclaim_threshold(mut self, ticks: u32) -> Self {
        self.reclaim_threshold = ticks;
        self
    }

    /// Approximate time overflow must persist before it is reclaimed.
    #[must_use]
    pub fn reclaim_after(&self) -> Duration {
        self.reclaim_interval
            .saturating_mul(self.reclaim_threshold.saturating_add(1))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Configuration(format!(
                "min_connections ({}) cannot be greater than max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}
