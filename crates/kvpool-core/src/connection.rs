//! Connection trait

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{ConnectionStatus, Result, StatusCell, Value};

/// A single live link to the key-value service
///
/// Implementations own a [`StatusCell`]; the provided methods expose it so
/// the pool can observe error and close events and flip the Busy/Ready state
/// on checkout and return.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the backend name (e.g., "redis")
    fn backend_name(&self) -> &str;

    /// Send one command with its arguments and return the reply
    ///
    /// The command string may carry inline arguments separated by whitespace;
    /// `args` are appended after them.
    async fn execute(&self, command: &str, args: &[Value]) -> Result<Value>;

    /// Close the connection gracefully
    async fn close(&self) -> Result<()>;

    /// The cell holding this connection's lifecycle state
    fn status_cell(&self) -> &StatusCell;

    /// Current lifecycle state
    fn status(&self) -> ConnectionStatus {
        self.status_cell().get()
    }

    /// Subscribe to lifecycle changes
    fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_cell().subscribe()
    }

    /// Called by the pool when the connection is handed to a caller
    fn mark_busy(&self) {
        self.status_cell().mark_busy();
    }

    /// Called by the pool when a caller returns the connection
    fn mark_ready(&self) {
        self.status_cell().mark_ready();
    }

    /// Check if the connection is closed
    fn is_closed(&self) -> bool {
        self.status().is_terminal()
    }
}
