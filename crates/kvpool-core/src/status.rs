//! Observable connection lifecycle state
//!
//! Every connection publishes its status through a `tokio::sync::watch`
//! channel so the pool can react to error and close events without polling.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle state of a single connection
///
/// Connecting → Ready → {Busy ⇄ Ready} → Closing → Closed, with any state
/// able to move to `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// The link is being established (or re-established)
    Connecting,
    /// Idle and usable
    Ready,
    /// Checked out by a caller
    Busy,
    /// Graceful shutdown in progress
    Closing,
    /// Shut down, will never be usable again
    Closed,
    /// Failed, will never be usable again
    Errored,
}

impl ConnectionStatus {
    /// Whether the connection can never serve requests again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Closing | ConnectionStatus::Closed | ConnectionStatus::Errored
        )
    }

    /// Whether the connection is healthy enough to hand out
    pub fn is_usable(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Ready => "ready",
            ConnectionStatus::Busy => "busy",
            ConnectionStatus::Closing => "closing",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Holder for a connection's status that observers can subscribe to
///
/// Terminal states are sticky: once a connection is closed or errored,
/// later transitions are ignored.
#[derive(Debug)]
pub struct StatusCell {
    sender: watch::Sender<ConnectionStatus>,
}

impl StatusCell {
    /// Create a cell starting in the given state
    pub fn new(initial: ConnectionStatus) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Current status
    pub fn get(&self) -> ConnectionStatus {
        *self.sender.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.sender.subscribe()
    }

    /// Move to a new status. Returns false if the cell was already terminal.
    pub fn set(&self, status: ConnectionStatus) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_terminal() || *current == status {
                return false;
            }
            *current = status;
            true
        });
        self.get() == status
    }

    /// Ready → Busy
    pub fn mark_busy(&self) {
        self.transition(ConnectionStatus::Ready, ConnectionStatus::Busy);
    }

    /// Busy → Ready
    pub fn mark_ready(&self) {
        self.transition(ConnectionStatus::Busy, ConnectionStatus::Ready);
    }

    fn transition(&self, from: ConnectionStatus, to: ConnectionStatus) {
        self.sender.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        });
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(ConnectionStatus::Connecting)
    }
}
