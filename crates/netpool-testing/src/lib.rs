//! # netpool-testing
//!
//! Test infrastructure for netpool development.
//!
//! ## Features
//!
//! - In-process TCP echo server for exercising pooled streams
//! - Mock connections that count how often they are closed
//! - Factories with scriptable failures and latency
//!
//! ## Example
//!
//! ```rust,ignore
//! use netpool::{Pool, PoolConfig};
//! use netpool_testing::MockFactory;
//!
//! #[tokio::test]
//! async fn test_floor() {
//!     let factory = MockFactory::new();
//!     let pool = Pool::new(PoolConfig::new().min_connections(2), factory.clone())
//!         .await
//!         .unwrap();
//!     assert_eq!(factory.created(), 2);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use fixtures::{MockConnection, MockFactory};
pub use mock_server::{MockEchoServer, MockServerError};
