//! Bounded connection pooling
//!
//! This module provides the pool the rest of the application borrows
//! connections from: a hard ceiling on live connections, LIFO reuse of idle
//! connections, a FIFO wait queue with per-waiter timeouts when saturated,
//! idle shrinkage back to a minimum, and eviction of connections that error
//! or close.
//!
//! # Example
//!
//! ```ignore
//! use kvpool_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10)
//!     .with_acquire_timeout_ms(5000)
//!     .with_idle_timeout_ms(30_000);
//!
//! let pool = ConnectionPool::connect(config, connector).await?;
//! let reply = pool
//!     .with_connection(|conn| async move { conn.execute("GET session:42", &[]).await })
//!     .await?;
//! pool.close().await;
//! ```

mod config;
mod lifecycle;
mod pool;
mod queue;
mod reaper;
mod state;
mod stats;


pub use config::PoolConfig;
pub use pool::{ConnectionPool, PooledConnection};
pub use state::ConnectionId;
pub use stats::PoolStats;
