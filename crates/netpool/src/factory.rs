//! Connection factories.
//!
//! A factory is the pool's only way to open connections. The pool calls it
//! while filling the floor at construction and whenever a lease is requested
//! with no idle connection and room below the ceiling. Its errors are handed
//! back to the caller untouched; the pool never retries.

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::BoxError;
use crate::lifecycle::Connection;

/// Produces new connections for a pool.
///
/// Any `Fn() -> impl Future<Output = Result<C, E>>` closure is a factory:
///
/// ```rust,ignore
/// let pool = Pool::new(config, || TcpStream::connect("127.0.0.1:7530")).await?;
/// ```
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: Connection;

    /// Open a new connection.
    async fn connect(&self) -> Result<Self::Connection, BoxError>;
}

#[async_trait]
impl<F, Fut, C, E> ConnectionFactory for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, E>> + Send,
    C: Connection,
    E: Into<BoxError>,
{
    type Connection = C;

    async fn connect(&self) -> Result<C, BoxError> {
        (self)().await.map_err(Into::into)
    }
}

/// Factory dialing a TCP address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Option<Duration>,
    nodelay: bool,
}

impl TcpConnector {
    /// Create a connector for `addr` (anything `host:port` shaped).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: None,
            nodelay: true,
        }
    }

    /// Fail a dial that takes longer than `timeout`.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Enable or disable `TCP_NODELAY` on new sockets (enabled by default).
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// The address being dialed.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnector {
    type Connection = TcpStream;

    async fn connect(&self) -> Result<TcpStream, BoxError> {
        let dial = TcpStream::connect(self.addr.as_str());
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, dial).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out after {timeout:?}", self.addr),
                )
            })??,
            None => dial.await?,
        };
        stream.set_nodelay(self.nodelay)?;
        tracing::trace!(addr = %self.addr, "dialed new connection");
        Ok(stream)
    }
}
