//! Error types for KVPool

use std::time::Duration;

use thiserror::Error;

/// Core error type for KVPool operations
#[derive(Error, Debug)]
pub enum KvError {
    /// A new connection did not become ready within the creation timeout
    #[error("Connection creation timed out after {0:?}")]
    CreationTimeout(Duration),

    /// The backend rejected a new connection (refused, auth failure, ...)
    #[error("Connection creation failed: {0}")]
    Creation(String),

    /// The pool stayed saturated for the whole acquire timeout
    #[error("Timed out waiting for a pooled connection (timeout: {0:?})")]
    AcquireTimeout(Duration),

    #[error("Connection pool is closed")]
    PoolClosed,

    /// Accepting another connection would exceed the pool ceiling
    #[error("Connection pool exhausted (max connections: {max})")]
    PoolExhausted { max: usize },

    #[error("Connection error: {0}")]
    Connection(String),

    /// The server is a read-only replica, typically after a failover
    #[error("Read-only replica: {0}")]
    ReadOnly(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl KvError {
    /// Errors caused by the link itself rather than by the command sent over it
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            KvError::Connection(_) | KvError::Io(_) | KvError::CreationTimeout(_)
        )
    }

    /// Failover condition that warrants reconnecting without any backoff
    pub fn is_read_only(&self) -> bool {
        matches!(self, KvError::ReadOnly(_))
    }

    /// Whether a caller may reasonably retry the operation later
    pub fn is_retryable(&self) -> bool {
        self.is_connection_error()
            || self.is_read_only()
            || matches!(
                self,
                KvError::AcquireTimeout(_) | KvError::Creation(_) | KvError::PoolExhausted { .. }
            )
    }
}

/// Result type alias for KVPool operations
pub type Result<T> = std::result::Result<T, KvError>;
