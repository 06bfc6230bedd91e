//! Leased connections.

use std::fmt;
use std::io::{self, IoSlice};
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::PoolError;
use crate::lifecycle::{Connection, ConnectionMetadata, ConnectionOrigin};
use crate::store::{Entry, Store};

/// A connection retrieved from the pool.
///
/// Derefs to the underlying connection and, for stream connections, reads
/// and writes through to it. Closing the lease with [`close`](Self::close),
/// or dropping it, hands the connection back to the pool instead of closing
/// it; the pool only closes it if the pool itself is closed or its idle
/// buffer is full. A lease is released exactly once no matter how it ends.
///
/// `AsyncWrite::poll_shutdown` on a lease only flushes: the transport stays
/// open for the next borrower.
pub struct PooledConnection<C: Connection> {
    entry: Option<Entry<C>>,
    store: Arc<Store<C>>,
}

impl<C: Connection> PooledConnection<C> {
    pub(crate) fn new(entry: Entry<C>, store: Arc<Store<C>>) -> Self {
        Self {
            entry: Some(entry),
            store,
        }
    }

    #[allow(clippy::expect_used)] // only `release` empties the slot, and it consumes or drops the lease
    fn entry(&self) -> &Entry<C> {
        self.entry
            .as_ref()
            .expect("lease holds its connection until released")
    }

    #[allow(clippy::expect_used)]
    fn entry_mut(&mut self) -> &mut Entry<C> {
        self.entry
            .as_mut()
            .expect("lease holds its connection until released")
    }

    /// Metadata the pool tracks for this connection.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.entry().meta
    }

    /// Pool-unique connection id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.metadata().id
    }

    /// Whether the connection is part of the floor or overflow.
    #[must_use]
    pub fn origin(&self) -> ConnectionOrigin {
        self.metadata().origin
    }

    /// Return the connection to the pool.
    ///
    /// Fails only if the pool had to close the connection (pool closed or
    /// idle buffer full) and the connection's close hook failed.
    pub fn close(mut self) -> Result<(), PoolError> {
        self.release()
    }

    /// Close the connection instead of returning it to the pool.
    ///
    /// Use this when the connection is known to be broken. The pool forgets
    /// it, freeing a slot below the ceiling.
    pub fn discard(mut self) -> Result<(), PoolError> {
        match self.entry.take() {
            Some(entry) => self.store.discard(entry),
            None => Err(PoolError::NoConnection),
        }
    }

    /// Detach the connection from the pool.
    ///
    /// The pool forgets the connection and will not close or reuse it.
    pub fn detach(mut self) -> Option<C> {
        self.entry.take().map(|entry| self.store.detach(entry))
    }

    fn release(&mut self) -> Result<(), PoolError> {
        self.store.release(self.entry.take())
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if self.entry.is_some() {
            // Close failures are logged and counted by the store.
            let _ = self.release();
        }
    }
}

impl<C: Connection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.entry().conn
    }
}

impl<C: Connection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.entry_mut().conn
    }
}

impl<C: Connection + fmt::Debug> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PooledConnection");
        if let Some(entry) = &self.entry {
            s.field("id", &entry.meta.id)
                .field("origin", &entry.meta.origin)
                .field("conn", &entry.conn);
        }
        s.finish_non_exhaustive()
    }
}

impl<C> AsyncRead for PooledConnection<C>
where
    C: Connection + AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_read(cx, buf)
    }
}

impl<C> AsyncWrite for PooledConnection<C>
where
    C: Connection + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut **self.get_mut()).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut **self.get_mut()).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        (**self).is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut **self.get_mut()).poll_flush(cx)
    }
}
