//! Pool error types.

use thiserror::Error;

/// Error produced by a [`ConnectionFactory`](crate::ConnectionFactory).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// The factory failed while the pool was being filled to its minimum.
    ///
    /// The partially filled pool has already been closed.
    #[error("connection is not able to fill the pool ({created} created): {source}")]
    InitialFill {
        /// Connections created before the failure.
        created: u32,
        /// The factory error.
        #[source]
        source: BoxError,
    },

    /// The factory failed while growing the pool on demand.
    #[error(transparent)]
    Connect(BoxError),

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Maximum connections reached and no idle connection is available.
    #[error("maximum connections ({max}) reached")]
    PoolExhausted {
        /// Maximum allowed connections.
        max: u32,
    },

    /// A release was attempted without a connection.
    #[error("connection is absent, rejecting release")]
    NoConnection,

    /// Closing the underlying connection failed.
    #[error("failed to close connection: {0}")]
    Close(#[from] std::io::Error),
}

impl PoolError {
    /// Whether retrying the operation later may succeed.
    ///
    /// Exhaustion clears as leases are returned and factory failures are
    /// usually transient network conditions. The pool never retries on its
    /// own; backoff is left to the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Connect(_))
    }

    /// Whether the error reports a closed pool.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_connect_error_is_transparent() {
        let source: BoxError = "connection refused".into();
        let err = PoolError::Connect(source);

        assert_eq!(err.to_string(), "connection refused");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_initial_fill_keeps_source() {
        let err = PoolError::InitialFill {
            created: 1,
            source: std::io::Error::other("dial failed").into(),
        };

        assert!(err.to_string().contains("1 created"));
        assert_eq!(err.source().unwrap().to_string(), "dial failed");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_classification() {
        assert!(PoolError::PoolExhausted { max: 4 }.is_retryable());
        assert!(PoolError::PoolClosed.is_closed());
        assert!(!PoolError::PoolClosed.is_retryable());
        assert!(!PoolError::NoConnection.is_retryable());
        assert!(!PoolError::Configuration("bad".into()).is_closed());
    }
}
