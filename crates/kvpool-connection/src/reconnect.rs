//! Auto-reconnect for pooled clients
//!
//! Clients handed out by the pool reconnect on their own: connection errors
//! are retried with capped exponential backoff, a `READONLY` failover reply
//! reconnects immediately, and running out of attempts marks the client
//! `Errored` so the pool evicts it.
//!
//! # Example
//!
//! ```ignore
//! use kvpool_connection::reconnect::{BackoffStrategy, ReconnectConfig, ReconnectingConnector};
//!
//! let config = ReconnectConfig::new(3, BackoffStrategy::new(50, 2_000));
//! let connector = ReconnectingConnector::new(RedisConnector::new(), config);
//!
//! // Every connection the pool opens through this connector retries on its own
//! let pool = ConnectionPool::connect(pool_config, Arc::new(connector)).await?;
//! ```

mod backoff;
mod wrapper;

#[cfg(test)]
mod tests;

pub use backoff::BackoffStrategy;
pub use wrapper::{ReconnectConfig, ReconnectEvent, ReconnectingConnection, ReconnectingConnector};
