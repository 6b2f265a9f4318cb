//! Connection pool implementation

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures::future::join_all;
use kvpool_core::{Connection, Connector, KvError, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::config::PoolConfig;
use super::lifecycle::{CreationOrigin, EvictionReason, Reservation, terminate};
use super::queue::Delivery;
use super::state::{ConnectionId, PoolState};
use super::stats::PoolStats;

/// Shared pool internals
///
/// All bookkeeping lives in `state` behind one mutex. The lock is only held
/// for synchronous list and queue manipulation, never across an `.await`.
pub(super) struct PoolInner {
    pub(super) config: PoolConfig,
    pub(super) connector: Arc<dyn Connector>,
    pub(super) state: Mutex<PoolState>,
    next_id: AtomicU64,
}

impl PoolInner {
    pub(super) fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Return a connection to the pool
    ///
    /// Hands it straight to the oldest waiter if there is one, otherwise
    /// pushes it onto the available stack and arms the idle reaper.
    pub(super) fn check_in(self: &Arc<Self>, id: ConnectionId, connection: Arc<dyn Connection>) {
        let mut state = self.state.lock();

        if state.closed {
            drop(state);
            tracing::debug!(connection_id = %id, "pool closed, terminating returned connection");
            terminate(connection);
            return;
        }

        if !state.connections.contains_key(&id) {
            // Evicted by its status observer while checked out
            drop(state);
            terminate(connection);
            return;
        }

        if connection.status().is_terminal() {
            state.remove(id);
            let replace = state.replacement_needed(&self.config);
            drop(state);
            tracing::info!(
                connection_id = %id,
                status = %connection.status(),
                reason = EvictionReason::Unhealthy.as_str(),
                "evicting connection returned in unusable state"
            );
            terminate(connection);
            if replace {
                self.spawn_replacement();
            }
            return;
        }

        connection.mark_ready();

        while let Some(waiter) = state.waiting.pop_front() {
            let waiter_id = waiter.id();
            let waited = waiter.waited();
            if waiter.deliver(Ok((id, Arc::clone(&connection)))).is_ok() {
                tracing::trace!(
                    connection_id = %id,
                    waiter_id,
                    waited_ms = waited.as_millis() as u64,
                    "handed connection to waiter"
                );
                return;
            }
        }

        let epoch = state.push_available(id);
        drop(state);
        self.arm_idle_timer(id, epoch);
    }
}

/// A bounded pool of connections to the key-value service
///
/// The pool keeps between `min_connections` and `max_connections` live
/// connections. Idle connections are reused most-recently-released first;
/// callers that find the pool saturated queue up and are served strictly in
/// arrival order, each for at most the acquire timeout.
///
/// `ConnectionPool` is a cheap handle: clone it to share the pool between
/// the components that need it.
#[derive(Clone)]
pub struct ConnectionPool {
    pub(super) inner: Arc<PoolInner>,
}

enum AcquireStep {
    Reuse(ConnectionId, Arc<dyn Connection>),
    Create(Reservation),
    Wait(u64, oneshot::Receiver<Delivery>),
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and connector
    ///
    /// No connection is opened until `warm_up` or the first `acquire`.
    pub fn new<C: Connector>(config: PoolConfig, connector: C) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                connector: Arc::new(connector),
                state: Mutex::new(PoolState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Validate the configuration, create the pool and eagerly open
    /// `min_connections` connections
    ///
    /// Warm-up is best-effort: connections that fail to open are logged and
    /// the pool is returned anyway.
    pub async fn connect<C: Connector>(config: PoolConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let pool = Self::new(config, connector);
        pool.warm_up().await;
        Ok(pool)
    }

    /// Open connections in parallel until the pool holds its minimum
    ///
    /// Returns how many connections were opened.
    #[tracing::instrument(skip(self))]
    pub async fn warm_up(&self) -> usize {
        let reservations = {
            let mut state = self.inner.state.lock();
            let max = self.inner.config.max_connections();
            let mut reservations = Vec::new();
            while !state.closed
                && state.total() + state.pending < self.inner.config.min_connections()
                && state.reserve(max)
            {
                reservations.push(Reservation::new(&self.inner, CreationOrigin::Background));
            }
            reservations
        };
        let wanted = reservations.len();

        let results = join_all(
            reservations
                .into_iter()
                .map(|reservation| self.inner.open_reserved(reservation)),
        )
        .await;

        let mut opened = 0;
        for result in results {
            match result {
                Ok((id, connection)) => {
                    self.inner.check_in(id, connection);
                    opened += 1;
                }
                Err(e) => tracing::warn!(error = %e, "failed to open warm-up connection"),
            }
        }

        tracing::info!(opened, requested = wanted, "connection pool warmed up");
        opened
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Reuse the most recently released idle connection, if any
    /// 2. If none is idle and the pool is under its ceiling, create a new one
    /// 3. Otherwise queue behind earlier waiters for up to the acquire timeout
    ///
    /// Returns `AcquireTimeout` if no connection was handed over in time,
    /// `PoolClosed` after `close`, or the creation error of a new connection.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        loop {
            let step = {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(KvError::PoolClosed);
                }

                if let Some((id, connection)) = state.pop_available() {
                    if connection.status().is_terminal() {
                        // Errored while idle and its observer has not run yet
                        state.remove(id);
                        let replace = state.replacement_needed(&self.inner.config);
                        drop(state);
                        terminate(connection);
                        if replace {
                            self.inner.spawn_replacement();
                        }
                        continue;
                    }
                    AcquireStep::Reuse(id, connection)
                } else if state.reserve(self.inner.config.max_connections()) {
                    AcquireStep::Create(Reservation::new(&self.inner, CreationOrigin::Caller))
                } else {
                    let (waiter_id, receiver) = state.waiting.push();
                    AcquireStep::Wait(waiter_id, receiver)
                }
            };

            return match step {
                AcquireStep::Reuse(id, connection) => Ok(self.checked_out(id, connection)),
                AcquireStep::Create(reservation) => {
                    let (id, connection) = self.inner.open_reserved(reservation).await?;
                    Ok(self.checked_out(id, connection))
                }
                AcquireStep::Wait(waiter_id, receiver) => {
                    self.wait_for_handoff(waiter_id, receiver).await
                }
            };
        }
    }

    async fn wait_for_handoff(
        &self,
        waiter_id: u64,
        receiver: oneshot::Receiver<Delivery>,
    ) -> Result<PooledConnection> {
        let timeout = self.inner.config.acquire_timeout();
        let mut ticket = WaitTicket {
            pool: Arc::clone(&self.inner),
            waiter_id,
            receiver,
            settled: false,
        };

        tracing::debug!(waiter_id, "pool saturated, waiting for a connection");

        let delivery = match tokio::time::timeout(timeout, &mut ticket.receiver).await {
            Ok(Ok(delivery)) => {
                ticket.settled = true;
                delivery
            }
            // Sender dropped without a delivery: only happens on shutdown
            Ok(Err(_)) => {
                ticket.settled = true;
                Err(KvError::PoolClosed)
            }
            Err(_) => match ticket.withdraw() {
                // A release raced the timer and won
                Some(delivery) => delivery,
                None => {
                    tracing::warn!(
                        waiter_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "timed out waiting for a pooled connection"
                    );
                    Err(KvError::AcquireTimeout(timeout))
                }
            },
        };

        let (id, connection) = delivery?;
        Ok(self.checked_out(id, connection))
    }

    fn checked_out(&self, id: ConnectionId, connection: Arc<dyn Connection>) -> PooledConnection {
        connection.mark_busy();
        PooledConnection {
            pool: Arc::clone(&self.inner),
            id,
            connection,
            checked_out_at: Instant::now(),
            released: false,
        }
    }

    /// Return a connection to the pool
    ///
    /// Equivalent to dropping the `PooledConnection`; taking it by value
    /// guarantees a connection is released at most once.
    pub fn release(&self, mut connection: PooledConnection) {
        if !Arc::ptr_eq(&self.inner, &connection.pool) {
            tracing::warn!(
                connection_id = %connection.id,
                "connection released to a pool that did not create it"
            );
        }
        connection.return_to_pool();
    }

    /// Run `f` with a pooled connection, releasing it on every exit path
    ///
    /// The connection is released exactly once whether `f` succeeds, fails,
    /// panics, or its future is dropped. `f` must not keep the connection
    /// beyond the returned future.
    pub async fn with_connection<F, Fut, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<KvError>,
    {
        let connection = self.acquire().await?;
        let result = f(Arc::clone(connection.inner())).await;
        self.release(connection);
        result
    }

    /// Shut the pool down
    ///
    /// Subsequent `acquire` calls fail with `PoolClosed`, every queued waiter
    /// is rejected with `PoolClosed`, and every tracked connection is closed.
    /// Calling `close` again is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) {
        let (waiters, connections) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                tracing::debug!("connection pool already closed");
                return;
            }
            state.closed = true;
            state.available.clear();
            let waiters = state.waiting.drain();
            let connections: Vec<_> = state
                .connections
                .drain()
                .map(|(_, entry)| entry.connection)
                .collect();
            (waiters, connections)
        };

        tracing::info!(
            connections = connections.len(),
            waiters = waiters.len(),
            "closing connection pool"
        );

        for waiter in waiters {
            let _ = waiter.deliver(Err(KvError::PoolClosed));
        }

        let results = join_all(connections.iter().map(|connection| connection.close())).await;
        for error in results.into_iter().filter_map(|result| result.err()) {
            tracing::warn!(error = %error, "error closing pooled connection");
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().stats()
    }

    /// Check whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("backend", &self.inner.connector.id())
            .field("endpoint", self.inner.config.endpoint())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A queued acquire request; withdraws itself from the queue if dropped
/// before it is settled
struct WaitTicket {
    pool: Arc<PoolInner>,
    waiter_id: u64,
    receiver: oneshot::Receiver<Delivery>,
    settled: bool,
}

impl WaitTicket {
    /// Leave the queue. Returns the delivery if a release already handed
    /// this waiter a connection.
    fn withdraw(&mut self) -> Option<Delivery> {
        self.settled = true;
        let removed = self.pool.state.lock().waiting.remove(self.waiter_id);
        if removed {
            None
        } else {
            self.receiver.try_recv().ok()
        }
    }
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(Ok((id, connection))) = self.withdraw() {
            self.pool.check_in(id, connection);
        }
    }
}

/// A connection borrowed from the pool
///
/// When dropped, the connection is automatically returned to the pool.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    id: ConnectionId,
    connection: Arc<dyn Connection>,
    checked_out_at: Instant,
    released: bool,
}

impl PooledConnection {
    /// Pool-assigned id of the underlying connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    fn return_to_pool(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        tracing::trace!(
            connection_id = %self.id,
            held_ms = self.checked_out_at.elapsed().as_millis() as u64,
            "releasing connection"
        );
        self.pool.check_in(self.id, Arc::clone(&self.connection));
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.return_to_pool();
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("status", &self.connection.status())
            .finish()
    }
}
