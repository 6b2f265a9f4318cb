//! Pool configuration types

use std::time::Duration;

use kvpool_core::{Endpoint, KvError, Result};
use serde::{Deserialize, Serialize};

use crate::reconnect::{BackoffStrategy, ReconnectConfig};

/// Configuration for a connection pool
///
/// Controls the endpoint, pool sizing, timeouts, and the reconnect
/// behavior of the clients the pool hands out. Immutable once the pool
/// is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Endpoint every pooled connection talks to
    endpoint: Endpoint,
    /// Minimum number of connections to maintain in the pool
    min_connections: usize,
    /// Maximum number of connections allowed in the pool
    max_connections: usize,
    /// Timeout in milliseconds when waiting for a saturated pool
    acquire_timeout_ms: u64,
    /// Timeout in milliseconds before an idle connection above the minimum is closed
    idle_timeout_ms: u64,
    /// Hard timeout in milliseconds for a new connection to become ready
    connect_timeout_ms: u64,
    /// Queue commands while a client is reconnecting instead of failing fast
    enable_offline_queue: bool,
    /// Reconnect attempts a client makes for a single command
    max_retries_per_request: u32,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_connections > max_connections` or if `max_connections` is 0.
    pub fn new(min_connections: usize, max_connections: usize) -> Self {
        assert!(
            max_connections > 0,
            "max_connections must be greater than 0, got {}",
            max_connections
        );
        assert!(
            min_connections <= max_connections,
            "min_connections ({}) cannot exceed max_connections ({})",
            min_connections,
            max_connections
        );

        Self {
            endpoint: Endpoint::default(),
            min_connections,
            max_connections,
            acquire_timeout_ms: 30_000, // 30 seconds default
            idle_timeout_ms: 30_000,    // 30 seconds default
            connect_timeout_ms: 10_000, // 10 seconds default
            enable_offline_queue: false,
            max_retries_per_request: 3,
        }
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the connection creation timeout in milliseconds
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Queue commands while a client reconnects (default: fail fast)
    pub fn with_offline_queue(mut self, enabled: bool) -> Self {
        self.enable_offline_queue = enabled;
        self
    }

    /// Set the reconnect attempts a client makes per command
    pub fn with_max_retries_per_request(mut self, retries: u32) -> Self {
        self.max_retries_per_request = retries;
        self
    }

    /// Check sizing constraints on a configuration that did not go through `new`
    /// (e.g. one deserialized from a file)
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(KvError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(KvError::Configuration(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(KvError::Configuration(
                "connect_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Get the endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Get the minimum pool size
    pub fn min_connections(&self) -> usize {
        self.min_connections
    }

    /// Get the maximum pool size
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Get the acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Get the connection creation timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Whether clients queue commands while reconnecting
    pub fn enable_offline_queue(&self) -> bool {
        self.enable_offline_queue
    }

    /// Reconnect attempts per command
    pub fn max_retries_per_request(&self) -> u32 {
        self.max_retries_per_request
    }

    /// Reconnect policy for clients created by this pool
    ///
    /// Backoff starts at 50ms and is capped at 2 seconds.
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::new(self.max_retries_per_request, BackoffStrategy::new(50, 2_000))
            .with_offline_queue(self.enable_offline_queue)
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - endpoint: redis://127.0.0.1:6379/0
    /// - min_connections: 2
    /// - max_connections: 10
    /// - acquire_timeout: 30 seconds
    /// - idle_timeout: 30 seconds
    /// - connect_timeout: 10 seconds
    /// - offline queue disabled, 3 retries per request
    fn default() -> Self {
        Self::new(2, 10)
    }
}
