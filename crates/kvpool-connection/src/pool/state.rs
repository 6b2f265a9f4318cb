//! Authoritative pool bookkeeping, guarded by a single mutex

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use kvpool_core::Connection;

use super::config::PoolConfig;
use super::queue::WaitQueue;
use super::stats::PoolStats;

/// Identifier the pool assigns to each connection it creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(super) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub(super) struct PoolEntry {
    pub(super) connection: Arc<dyn Connection>,
    pub(super) created_at: Instant,
    /// Bumped every time the connection enters `available`
    idle_epoch: u64,
}

/// Everything the pool knows, mutated only with the lock held
///
/// `available` is a stack: the most recently released connection is reused
/// first. `waiting` is a queue: the oldest waiter is served first.
#[derive(Default)]
pub(super) struct PoolState {
    pub(super) connections: HashMap<ConnectionId, PoolEntry>,
    pub(super) available: Vec<ConnectionId>,
    pub(super) waiting: WaitQueue,
    /// Creations in flight; they count against the ceiling
    pub(super) pending: usize,
    pub(super) closed: bool,
    next_epoch: u64,
}

impl PoolState {
    pub(super) fn total(&self) -> usize {
        self.connections.len()
    }

    pub(super) fn in_use(&self) -> usize {
        self.connections.len() - self.available.len()
    }

    fn committed(&self) -> usize {
        self.connections.len() + self.pending
    }

    /// Claim a slot for a connection about to be created
    pub(super) fn reserve(&mut self, max: usize) -> bool {
        if self.committed() < max {
            self.pending += 1;
            true
        } else {
            false
        }
    }

    pub(super) fn insert(&mut self, id: ConnectionId, connection: Arc<dyn Connection>) {
        self.pending = self.pending.saturating_sub(1);
        self.connections.insert(
            id,
            PoolEntry {
                connection,
                created_at: Instant::now(),
                idle_epoch: 0,
            },
        );
    }

    /// Pop the most recently released connection
    pub(super) fn pop_available(&mut self) -> Option<(ConnectionId, Arc<dyn Connection>)> {
        while let Some(id) = self.available.pop() {
            if let Some(entry) = self.connections.get(&id) {
                return Some((id, Arc::clone(&entry.connection)));
            }
        }
        None
    }

    /// Put a connection back on the stack; returns the epoch identifying this idle period
    pub(super) fn push_available(&mut self, id: ConnectionId) -> u64 {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        if let Some(entry) = self.connections.get_mut(&id) {
            entry.idle_epoch = epoch;
        }
        self.available.push(id);
        epoch
    }

    /// Whether the connection has sat in `available` since the given release
    pub(super) fn is_idle_since(&self, id: ConnectionId, epoch: u64) -> bool {
        self.available.contains(&id)
            && self
                .connections
                .get(&id)
                .is_some_and(|entry| entry.idle_epoch == epoch)
    }

    /// Unregister a connection from every set it is in
    pub(super) fn remove(&mut self, id: ConnectionId) -> Option<PoolEntry> {
        let entry = self.connections.remove(&id)?;
        self.available.retain(|candidate| *candidate != id);
        Some(entry)
    }

    /// Whether a background creation should be started: the pool fell below
    /// its minimum, or waiters are queued while a slot is free.
    pub(super) fn replacement_needed(&self, config: &PoolConfig) -> bool {
        if self.closed {
            return false;
        }
        let committed = self.committed();
        committed < config.min_connections()
            || (!self.waiting.is_empty() && committed < config.max_connections())
    }

    pub(super) fn stats(&self) -> PoolStats {
        PoolStats::new(
            self.total(),
            self.available.len(),
            self.in_use(),
            self.waiting.len(),
        )
    }
}
