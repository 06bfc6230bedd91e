//! Mock Echo Server Fidelity Tests
//!
//! These tests check that the echo server behaves like a plain TCP peer, so
//! pool tests built on it exercise real socket reuse and hang-ups.
//!
//! ```bash
//! cargo test -p netpool-testing --test mock_fidelity
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use netpool_testing::MockEchoServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_mock_server_starts_and_listens() {
    let server = MockEchoServer::start().await.expect("Server should start");

    assert!(server.addr().port() > 0, "Should have valid port");
    assert!(server.addr().ip().is_loopback(), "Should listen on localhost");
    assert_eq!(server.accepted(), 0, "Should start with no connections");
    assert_eq!(server.open_connections(), 0);

    server.stop();
}

#[tokio::test]
async fn test_mock_server_echoes() {
    let server = MockEchoServer::start().await.unwrap();
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();

    stream.write_all(b"hello pool").await.unwrap();
    let mut buf = [0u8; 10];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello pool");

    server
        .wait_for_open(1, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn test_mock_server_tracks_hang_ups() {
    let server = MockEchoServer::start().await.unwrap();
    let first = TcpStream::connect(server.addr()).await.unwrap();
    let second = TcpStream::connect(server.addr()).await.unwrap();

    server
        .wait_for_open(2, Duration::from_secs(5))
        .await
        .unwrap();

    drop(first);
    server
        .wait_for_open(1, Duration::from_secs(5))
        .await
        .unwrap();

    drop(second);
    server
        .wait_for_open(0, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn test_mock_server_stop_refuses_new_connections() {
    let server = MockEchoServer::start().await.unwrap();
    let addr = server.addr();
    drop(server);

    // The accept loop exits on the shutdown signal and drops the listener.
    let mut refused = false;
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refused, "listener should be closed after stop");
}
