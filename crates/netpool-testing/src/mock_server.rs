//! Mock TCP echo server for tests.
//!
//! Every accepted connection echoes back whatever it reads until the client
//! hangs up. The server counts accepted and currently open connections so
//! tests can tell whether the pool reused a stream or dialed a new one.
//!
//! ## Example
//!
//! ```rust,ignore
//! use netpool_testing::MockEchoServer;
//!
//! #[tokio::test]
//! async fn test_echo() {
//!     let server = MockEchoServer::start().await.unwrap();
//!     let addr = server.addr();
//!     // Connect a pool to addr...
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The expected condition was not reached in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicUsize,
    open: AtomicUsize,
}

/// A TCP echo server bound to an ephemeral localhost port.
///
/// The server stops when [`stop`](Self::stop) is called or it is dropped.
/// Connections already accepted keep echoing until their client closes.
#[derive(Debug)]
pub struct MockEchoServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    counters: Arc<Counters>,
}

impl MockEchoServer {
    /// Start the server on an available port.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let counters = Arc::new(Counters::default());

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            counters: counters.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                counters.accepted.fetch_add(1, Ordering::SeqCst);
                                counters.open.fetch_add(1, Ordering::SeqCst);
                                let counters = counters.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = echo(stream).await {
                                        tracing::debug!(%peer, error = %e, "echo connection failed");
                                    }
                                    counters.open.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "accept failed");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the address as a `host:port` string.
    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    /// Total connections accepted since start.
    pub fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Wait until exactly `count` connections are open.
    ///
    /// Closing a client socket reaches the server asynchronously, so tests
    /// asserting on hang-ups poll instead of checking once.
    pub async fn wait_for_open(&self, count: usize, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.open_connections() != count {
            if tokio::time::Instant::now() >= deadline {
                return Err(MockServerError::Timeout("open connection count"));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockEchoServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn echo(mut stream: TcpStream) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        stream.write_all(&buf[..n]).await?;
    }
}
