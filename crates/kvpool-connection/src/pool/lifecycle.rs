//! Connection lifecycle: creation, status observation, teardown
//!
//! Creation happens outside the pool lock. A slot is reserved first (so the
//! ceiling holds while the network round-trip is in flight), then the
//! connector is awaited under the hard creation timeout.

use std::future::Future;
use std::sync::{Arc, Weak};

use kvpool_core::{Connection, ConnectionStatus, KvError, Result};

use super::pool::PoolInner;
use super::state::ConnectionId;

/// Who asked for a connection to be created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CreationOrigin {
    /// An `acquire()` caller that will receive the connection
    Caller,
    /// Warm-up or replacement work nobody is waiting on directly
    Background,
}

/// Why a connection left the pool. Never surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EvictionReason {
    /// The client reported an error event
    Errored,
    /// The client reported a close event
    Closed,
    /// Returned to the pool in an unusable state
    Unhealthy,
    /// Sat idle past the idle timeout while above the minimum
    Idle,
}

impl EvictionReason {
    fn from_status(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Errored => EvictionReason::Errored,
            _ => EvictionReason::Closed,
        }
    }

    pub(super) fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Errored => "errored",
            EvictionReason::Closed => "closed",
            EvictionReason::Unhealthy => "unhealthy",
            EvictionReason::Idle => "idle",
        }
    }
}

/// Run a task on the ambient tokio runtime, if there is one
pub(super) fn spawn_background<F>(task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => {
            tracing::warn!("no tokio runtime available, skipping background pool task");
        }
    }
}

/// Gracefully close a connection in the background
pub(super) fn terminate(connection: Arc<dyn Connection>) {
    spawn_background(async move {
        if let Err(e) = connection.close().await {
            tracing::debug!(error = %e, "error while closing connection");
        }
    });
}

/// A slot counted in `pending` while its connection is being opened
///
/// Dropping it before the connection is registered (the creating future was
/// cancelled) gives the slot back, so the ceiling only counts real work.
pub(super) struct Reservation {
    pool: Arc<PoolInner>,
    origin: CreationOrigin,
    armed: bool,
}

impl Reservation {
    /// Wrap a slot the caller has just claimed with `PoolState::reserve`
    ///
    /// Must not be dropped while the pool lock is held.
    pub(super) fn new(pool: &Arc<PoolInner>, origin: CreationOrigin) -> Self {
        Self {
            pool: Arc::clone(pool),
            origin,
            armed: true,
        }
    }

    /// The slot now belongs to a registered connection
    fn disarm(&mut self) {
        self.armed = false;
    }

    /// Return the slot, starting a replacement if the pool still needs one
    fn give_back(&mut self, allow_replacement: bool) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let replace = {
            let mut state = self.pool.state.lock();
            state.pending = state.pending.saturating_sub(1);
            allow_replacement && state.replacement_needed(&self.pool.config)
        };
        if replace {
            self.pool.spawn_replacement();
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(origin = ?self.origin, "connection creation cancelled, releasing slot");
        }
        self.give_back(true);
    }
}

impl PoolInner {
    /// Reserve a slot and open a connection in it
    ///
    /// Fails fast with `PoolExhausted` when the ceiling is already reached.
    pub(super) async fn create_connection(
        self: &Arc<Self>,
        origin: CreationOrigin,
    ) -> Result<(ConnectionId, Arc<dyn Connection>)> {
        let reservation = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(KvError::PoolClosed);
            }
            if !state.reserve(self.config.max_connections()) {
                return Err(KvError::PoolExhausted {
                    max: self.config.max_connections(),
                });
            }
            Reservation::new(self, origin)
        };
        self.open_reserved(reservation).await
    }

    /// Open a connection for a slot already counted in `pending`
    #[tracing::instrument(
        skip(self, reservation),
        fields(endpoint = %self.config.endpoint(), origin = ?reservation.origin)
    )]
    pub(super) async fn open_reserved(
        self: &Arc<Self>,
        mut reservation: Reservation,
    ) -> Result<(ConnectionId, Arc<dyn Connection>)> {
        let timeout = self.config.connect_timeout();
        let outcome =
            tokio::time::timeout(timeout, self.connector.connect(self.config.endpoint())).await;

        // Only caller-driven failures re-trigger creation, so an unreachable
        // backend cannot spin background work in a loop.
        let retry = reservation.origin == CreationOrigin::Caller;
        let connection = match outcome {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to create connection");
                reservation.give_back(retry);
                return Err(match e {
                    KvError::Creation(_) | KvError::CreationTimeout(_) => e,
                    other => KvError::Creation(other.to_string()),
                });
            }
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "connection creation timed out");
                reservation.give_back(retry);
                return Err(KvError::CreationTimeout(timeout));
            }
        };

        let id = self.next_connection_id();
        {
            let mut state = self.state.lock();
            reservation.disarm();
            if state.closed {
                state.pending = state.pending.saturating_sub(1);
                drop(state);
                terminate(connection);
                return Err(KvError::PoolClosed);
            }
            state.insert(id, Arc::clone(&connection));
        }

        self.observe(id, &connection);
        tracing::debug!(connection_id = %id, "connection created");
        Ok((id, connection))
    }

    /// Watch the connection's status and evict it on an error or close event,
    /// whichever set it currently sits in
    fn observe(self: &Arc<Self>, id: ConnectionId, connection: &Arc<dyn Connection>) {
        let mut status = connection.subscribe_status();
        let pool: Weak<PoolInner> = Arc::downgrade(self);

        spawn_background(async move {
            loop {
                let current = *status.borrow_and_update();
                if current.is_terminal() {
                    if let Some(pool) = pool.upgrade() {
                        pool.evict(id, EvictionReason::from_status(current));
                    }
                    return;
                }
                // Sender gone means the connection itself was dropped
                if status.changed().await.is_err() {
                    return;
                }
            }
        });
    }

    /// Remove a connection from the pool, close it, and replace it if needed
    pub(super) fn evict(self: &Arc<Self>, id: ConnectionId, reason: EvictionReason) {
        let (entry, replace) = {
            let mut state = self.state.lock();
            let entry = state.remove(id);
            let replace = entry.is_some() && state.replacement_needed(&self.config);
            (entry, replace)
        };

        let Some(entry) = entry else {
            return;
        };

        tracing::info!(
            connection_id = %id,
            reason = reason.as_str(),
            age_ms = entry.created_at.elapsed().as_millis() as u64,
            "evicting connection from pool"
        );
        terminate(entry.connection);

        if replace {
            self.spawn_replacement();
        }
    }

    /// Create one connection in the background and check it in
    ///
    /// Failures are logged and never reach any caller.
    pub(super) fn spawn_replacement(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        spawn_background(async move {
            match pool.create_connection(CreationOrigin::Background).await {
                Ok((id, connection)) => {
                    tracing::debug!(connection_id = %id, "replacement connection ready");
                    pool.check_in(id, connection);
                }
                Err(KvError::PoolClosed | KvError::PoolExhausted { .. }) => {
                    tracing::debug!("replacement connection no longer needed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "background replacement connection failed");
                }
            }
        });
    }
}
