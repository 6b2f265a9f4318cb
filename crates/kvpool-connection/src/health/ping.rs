//! PING health check

use std::time::Duration;

use kvpool_core::Connection;
use thiserror::Error;

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Error that can occur during a ping operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PingError {
    #[error("Connection is {0}")]
    ConnectionClosed(String),

    #[error("PING failed: {0}")]
    CommandFailed(String),

    #[error("PING timed out after {0:?}")]
    Timeout(Duration),
}

/// Send `PING` over the connection and return the round-trip time.
///
/// A connection already in a terminal state is not pinged.
pub async fn ping_connection(conn: &dyn Connection, timeout: Duration) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed(conn.status().to_string()));
    }

    let start = tokio::time::Instant::now();
    match tokio::time::timeout(timeout, conn.execute("PING", &[])).await {
        Ok(Ok(_)) => Ok(start.elapsed()),
        Ok(Err(e)) => Err(PingError::CommandFailed(e.to_string())),
        Err(_) => Err(PingError::Timeout(timeout)),
    }
}
