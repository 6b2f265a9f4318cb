//! Subcommand implementations
//!
//! Each command takes the pool by reference so it can run against any
//! connector; only [`build_pool`] knows about Redis.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use kvpool_connection::{
    ConnectionPool, HealthStatus, PoolStats, ReconnectingConnector, ping_connection,
};
use kvpool_core::Value;
use kvpool_driver_redis::RedisConnector;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::AppConfig;

/// Open the pool described by `config`, warming it to its minimum size
pub async fn build_pool(config: &AppConfig) -> anyhow::Result<ConnectionPool> {
    let connector =
        ReconnectingConnector::new(RedisConnector::new(), config.pool.reconnect_config());

    tracing::info!(
        endpoint = %config.pool.endpoint(),
        min = config.pool.min_connections(),
        max = config.pool.max_connections(),
        "opening connection pool"
    );

    ConnectionPool::connect(config.pool.clone(), connector)
        .await
        .context("Failed to create connection pool")
}

/// Outcome of a single PING through the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReport {
    pub latency: Duration,
    pub health: HealthStatus,
}

pub async fn ping(pool: &ConnectionPool) -> anyhow::Result<PingReport> {
    let connection = pool
        .acquire()
        .await
        .context("Failed to acquire a connection")?;
    let result = ping_connection(connection.inner().as_ref(), pool.config().connect_timeout()).await;
    pool.release(connection);

    let latency = result.context("Server did not answer PING")?;
    Ok(PingReport {
        latency,
        health: HealthStatus::from_latency(latency),
    })
}

/// Pool statistics as printed by `kvpool stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub endpoint: String,
    pub min_connections: usize,
    pub max_connections: usize,
    pub stats: PoolStats,
    pub utilization: f64,
}

pub fn stats(pool: &ConnectionPool) -> StatsReport {
    let stats = pool.stats();
    StatsReport {
        endpoint: pool.config().endpoint().redacted_url(),
        min_connections: pool.config().min_connections(),
        max_connections: pool.config().max_connections(),
        stats,
        utilization: stats.utilization(),
    }
}

/// Outcome of `kvpool bench`
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub requests: usize,
    pub errors: usize,
    pub elapsed: Duration,
    pub stats: PoolStats,
}

impl BenchReport {
    /// Completed requests per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.requests as f64 / secs
    }
}

/// Issue `requests` PINGs through `with_connection` from `concurrency` tasks
#[tracing::instrument(skip(pool))]
pub async fn bench(pool: &ConnectionPool, requests: usize, concurrency: usize) -> BenchReport {
    let next = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let workers = (0..concurrency.max(1)).map(|_| {
        let pool = pool.clone();
        let next = Arc::clone(&next);
        let errors = Arc::clone(&errors);
        tokio::spawn(async move {
            while next.fetch_add(1, Ordering::SeqCst) < requests {
                let result: kvpool_core::Result<Value> = pool
                    .with_connection(|conn| async move { conn.execute("PING", &[]).await })
                    .await;
                if let Err(e) = result {
                    tracing::debug!(error = %e, "bench request failed");
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
    });

    for joined in join_all(workers).await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "bench worker panicked");
        }
    }

    let report = BenchReport {
        requests,
        errors: errors.load(Ordering::SeqCst),
        elapsed: start.elapsed(),
        stats: pool.stats(),
    };
    tracing::info!(
        requests,
        errors = report.errors,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "bench finished"
    );
    report
}

/// Log pool statistics every `interval` until `shutdown` resolves, then
/// close the pool
///
/// A pool that fell below its minimum (for example because the server was
/// down at startup) is topped up on each tick.
pub async fn serve(pool: &ConnectionPool, interval: Duration, shutdown: impl Future<Output = ()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let stats = pool.stats();
                tracing::info!(
                    total = stats.total(),
                    available = stats.available(),
                    in_use = stats.in_use(),
                    waiting = stats.waiting(),
                    "pool statistics"
                );
                if stats.total() < pool.config().min_connections() {
                    pool.warm_up().await;
                }
            }
        }
    }

    tracing::info!("shutting down connection pool");
    pool.close().await;
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
