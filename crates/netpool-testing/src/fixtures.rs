//! Mock connections and factories.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use netpool::{BoxError, Connection, ConnectionFactory};

#[derive(Debug, Default)]
struct Shared {
    attempts: AtomicUsize,
    created: AtomicUsize,
    closed: AtomicUsize,
    failing: AtomicBool,
    fail_after: AtomicUsize,
    fail_close: AtomicBool,
    delay_ms: AtomicU64,
    next_id: AtomicU32,
}

/// A connection that records its own closing in the factory's counters.
#[derive(Debug)]
pub struct MockConnection {
    id: u32,
    closed: bool,
    shared: Arc<Shared>,
}

impl MockConnection {
    /// Sequence number assigned by the factory, starting at 1.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether the pool has run this connection's close hook.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Connection for MockConnection {
    fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            self.closed = true;
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock close failure"));
        }
        Ok(())
    }
}

/// A factory producing [`MockConnection`]s.
///
/// Clones share counters and failure settings, so a test can keep one clone
/// for assertions while the pool owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    shared: Arc<Shared>,
}

impl MockFactory {
    /// Create a factory that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent connect fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail every connect once `count` connections have been created.
    pub fn fail_after(self, count: usize) -> Self {
        self.shared.fail_after.store(count, Ordering::SeqCst);
        self
    }

    /// Make connection close hooks report an error.
    pub fn set_fail_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Sleep for `delay` inside every connect.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.shared
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Number of connect calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Connections successfully created.
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    /// Connections whose close hook has run.
    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Connections created and not yet closed.
    pub fn live(&self) -> usize {
        self.created().saturating_sub(self.closed())
    }

    fn should_fail(&self) -> bool {
        if self.shared.failing.load(Ordering::SeqCst) {
            return true;
        }
        let limit = self.shared.fail_after.load(Ordering::SeqCst);
        limit > 0 && self.created() >= limit
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, BoxError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.shared.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.should_fail() {
            return Err(
                io::Error::new(io::ErrorKind::ConnectionRefused, "mock connect refused").into(),
            );
        }

        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            id: self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            closed: false,
            shared: self.shared.clone(),
        })
    }
}
