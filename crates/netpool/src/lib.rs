//! # netpool
//!
//! Bounded pool of reusable network connections.
//!
//! The pool keeps a floor of `min_connections` connections open from the
//! moment it is created and grows on demand up to `max_connections`. It never
//! queues callers: when the ceiling is reached and nothing is idle, `get`
//! fails immediately with [`PoolError::PoolExhausted`].
//!
//! ## Features
//!
//! - Floor connections opened up front, overflow opened on demand
//! - Leases that return their connection to the pool on close or drop
//! - Background reclamation of overflow after sustained use above the floor
//! - Pluggable connection factories, including plain async closures
//! - A single lock over the idle buffer and all accounting
//!
//! ## Example
//!
//! ```rust,no_run
//! use netpool::{Pool, PoolConfig, TcpConnector};
//! use tokio::io::AsyncWriteExt;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PoolConfig::new().min_connections(2).max_connections(20);
//! let pool = Pool::new(config, TcpConnector::new("127.0.0.1:7530")).await?;
//!
//! let mut conn = pool.get().await?;
//! conn.write_all(b"hello").await?;
//! // Hand the connection back for the next caller.
//! conn.close()?;
//!
//! pool.close();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod factory;
pub mod lease;
pub mod lifecycle;
pub mod metrics;
pub mod pool;

mod reclaim;
mod store;

pub use config::{DEFAULT_RECLAIM_INTERVAL, DEFAULT_RECLAIM_THRESHOLD, PoolConfig};
pub use error::{BoxError, PoolError};
pub use factory::{ConnectionFactory, TcpConnector};
pub use lease::PooledConnection;
pub use lifecycle::{Connection, ConnectionMetadata, ConnectionOrigin};
pub use metrics::{PoolMetrics, PoolStatus};
pub use pool::{Pool, PoolBuilder};
