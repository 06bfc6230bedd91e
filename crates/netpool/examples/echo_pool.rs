//! Pooled TCP connections against an echo server.
//!
//! Starts an in-process echo server unless `ECHO_ADDR` points at one, then
//! runs a burst of concurrent workers through a small pool and prints how
//! the pool grew and what it reused.
//!
//! # Running
//!
//! ```bash
//! cargo run -p netpool --example echo_pool
//!
//! # Against an external echo server
//! ECHO_ADDR=127.0.0.1:7 cargo run -p netpool --example echo_pool
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use netpool::{Pool, PoolConfig, PoolError, TcpConnector};
use netpool_testing::MockEchoServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let local_server;
    let addr = match std::env::var("ECHO_ADDR") {
        Ok(addr) => addr,
        Err(_) => {
            local_server = MockEchoServer::start().await?;
            local_server.addr_string()
        }
    };

    println!("=== Echo Pool Example ===\n");

    let config = PoolConfig::new()
        .min_connections(2)
        .max_connections(4)
        .reclaim_interval(Duration::from_secs(1))
        .reclaim_threshold(2);

    println!("Pool configuration:");
    println!("  Min connections: {}", config.min_connections);
    println!("  Max connections: {}", config.max_connections);
    println!("  Overflow reclaimed after: {:?}", config.reclaim_after());
    println!();

    let connector = TcpConnector::new(addr.clone()).connect_timeout(Duration::from_secs(5));
    let pool = Pool::new(config, connector).await?;
    println!("Connected to {addr}, {} idle connections\n", pool.size());

    let mut workers = Vec::new();
    for worker in 0..6 {
        workers.push(tokio::spawn(run_worker(pool.clone(), worker)));
    }
    for worker in workers {
        worker.await??;
    }

    let status = pool.status();
    println!("\nAfter the burst:");
    println!("  Idle: {}", status.idle);
    println!("  Overflow: {}", status.overflow);

    println!("\nWaiting for the reclaimer...");
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let status = pool.status();
    let metrics = pool.metrics();
    println!("  Idle: {}", status.idle);
    println!("  Overflow: {}", status.overflow);
    println!("  Created: {}", metrics.connections_created);
    println!("  Reclaimed: {}", metrics.reclaimed);
    println!(
        "  Checkout success rate: {:.1}%",
        metrics.checkout_success_rate() * 100.0
    );

    pool.close();
    println!("\nPool closed");
    Ok(())
}

async fn run_worker(pool: Pool<TcpConnector>, worker: usize) -> Result<(), BoxError> {
    let message = format!("hello from worker {worker}");
    let mut conn = match pool.get().await {
        Ok(conn) => conn,
        Err(PoolError::PoolExhausted { max }) => {
            println!("  worker {worker}: pool exhausted ({max} connections busy)");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    conn.write_all(message.as_bytes()).await?;
    let mut buf = vec![0u8; message.len()];
    conn.read_exact(&mut buf).await?;
    println!(
        "  worker {worker}: connection #{} ({:?}) echoed {:?}",
        conn.id(),
        conn.origin(),
        String::from_utf8_lossy(&buf)
    );

    // Hold the connection briefly so the other workers overlap.
    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.close()?;
    Ok(())
}
