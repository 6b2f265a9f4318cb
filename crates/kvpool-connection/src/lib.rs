//! KVPool Connection - Pooled connection management for the key-value backend
//!
//! This crate handles connection lifecycle, pooling, reconnection and
//! health probing.

pub mod health;
pub mod pool;
pub mod reconnect;

pub use health::{HealthStatus, HealthThresholds, PingError, PingResult, ping_connection};
pub use pool::{ConnectionId, ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use reconnect::{
    BackoffStrategy, ReconnectConfig, ReconnectEvent, ReconnectingConnection, ReconnectingConnector,
};
