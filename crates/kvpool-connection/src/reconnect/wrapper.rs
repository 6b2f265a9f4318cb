//! Reconnecting connection wrapper with automatic retry
//!
//! The wrapper owns the pool-visible status of a client. Reconnects happen
//! behind it without the pool noticing; only when the retry budget for a
//! command is exhausted does the status flip to `Errored`, which the pool
//! observes and turns into an eviction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kvpool_core::{
    Connection, ConnectionStatus, Connector, Endpoint, KvError, Result, StatusCell, Value,
};
use tokio::sync::Mutex;

use super::BackoffStrategy;

/// Configuration for automatic reconnection behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts for a single command (0 = never reconnect)
    max_attempts: u32,
    /// Backoff strategy for delays between attempts
    backoff: BackoffStrategy,
    /// Whether commands wait for an in-flight reconnect instead of failing fast
    offline_queue: bool,
}

impl ReconnectConfig {
    /// Create a new reconnect configuration
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Reconnect attempts per command before the client is marked errored
    /// * `backoff` - Backoff strategy for calculating delays
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts,
            backoff,
            offline_queue: false,
        }
    }

    /// Set whether commands issued during a reconnect wait for it (default: false)
    pub fn with_offline_queue(mut self, offline_queue: bool) -> Self {
        self.offline_queue = offline_queue;
        self
    }

    /// Get the maximum number of reconnect attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get the backoff strategy
    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }

    /// Check if commands are queued while reconnecting
    pub fn offline_queue(&self) -> bool {
        self.offline_queue
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(3, BackoffStrategy::default())
    }
}

/// Reconnection event for monitoring
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectEvent {
    /// A reconnection attempt is starting
    Attempting {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    /// A reconnection attempt succeeded
    Succeeded { attempts_taken: u32 },
    /// A reconnection attempt failed
    Failed { attempt: u32, error: String },
    /// All reconnection attempts exhausted
    Exhausted { total_attempts: u32 },
}

impl ReconnectEvent {
    fn log(&self, endpoint: &Endpoint) {
        match self {
            ReconnectEvent::Attempting { .. } => {
                tracing::debug!(endpoint = %endpoint, event = ?self, "reconnecting");
            }
            ReconnectEvent::Succeeded { .. } => {
                tracing::info!(endpoint = %endpoint, event = ?self, "reconnected");
            }
            ReconnectEvent::Failed { .. } => {
                tracing::warn!(endpoint = %endpoint, event = ?self, "reconnect attempt failed");
            }
            ReconnectEvent::Exhausted { .. } => {
                tracing::error!(endpoint = %endpoint, event = ?self, "giving up on connection");
            }
        }
    }
}

/// The live client plus a generation counter so concurrent callers that saw
/// the same failure reconnect only once
struct Slot {
    connection: Option<Arc<dyn Connection>>,
    generation: u64,
}

/// A connection wrapper that reconnects and retries failed commands
///
/// Connection errors are retried with capped exponential backoff. A
/// `READONLY` reply (the server was demoted during a failover) triggers an
/// immediate reconnect with no delay. Command errors are returned as-is.
///
/// # Example
///
/// ```ignore
/// use kvpool_connection::reconnect::{ReconnectConfig, ReconnectingConnection};
///
/// let conn = ReconnectingConnection::connect(connector, endpoint, ReconnectConfig::default()).await?;
///
/// // Retries transparently if the link drops mid-flight
/// let reply = conn.execute("GET", &["key".into()]).await?;
/// ```
pub struct ReconnectingConnection {
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    config: ReconnectConfig,
    /// Current client, replaced on reconnect; held across the connect await
    slot: Mutex<Slot>,
    /// Set while a reconnect is in flight
    reconnecting: AtomicBool,
    reconnects: AtomicU64,
    status: StatusCell,
    backend_name: String,
}

impl ReconnectingConnection {
    /// Open the first client and wrap it
    ///
    /// The initial connect is not retried; the caller's own creation timeout
    /// governs it.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        endpoint: Endpoint,
        config: ReconnectConfig,
    ) -> Result<Arc<Self>> {
        let connection = connector.connect(&endpoint).await?;
        Ok(Self::wrap(connection, connector, endpoint, config))
    }

    /// Wrap an already-established client
    pub fn wrap(
        connection: Arc<dyn Connection>,
        connector: Arc<dyn Connector>,
        endpoint: Endpoint,
        config: ReconnectConfig,
    ) -> Arc<Self> {
        let backend_name = connection.backend_name().to_string();
        Arc::new(Self {
            connector,
            endpoint,
            config,
            slot: Mutex::new(Slot {
                connection: Some(connection),
                generation: 0,
            }),
            reconnecting: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
            status: StatusCell::new(ConnectionStatus::Ready),
            backend_name,
        })
    }

    /// Number of successful reconnects since creation
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Whether a reconnect is currently in flight
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Get the reconnect configuration
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Snapshot the current client, honoring the offline queue setting
    async fn current(&self) -> Result<(u64, Option<Arc<dyn Connection>>)> {
        if self.is_reconnecting() && !self.config.offline_queue() {
            return Err(KvError::Connection(
                "connection is reconnecting and the offline queue is disabled".into(),
            ));
        }
        // Blocks behind an in-flight reconnect when queuing is enabled
        let slot = self.slot.lock().await;
        Ok((slot.generation, slot.connection.clone()))
    }

    /// Replace the client seen at `generation` with a fresh one
    ///
    /// If another caller already replaced it, the newer client is returned
    /// without opening a second one.
    async fn reconnect(&self, generation: u64) -> Result<(u64, Arc<dyn Connection>)> {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation {
            if let Some(connection) = slot.connection.clone() {
                return Ok((slot.generation, connection));
            }
        }

        let in_flight = InFlight::start(&self.reconnecting);
        if let Some(stale) = slot.connection.take() {
            if let Err(e) = stale.close().await {
                tracing::debug!(error = %e, "error while closing stale client");
            }
        }
        slot.generation += 1;
        let outcome = self.connector.connect(&self.endpoint).await;
        in_flight.finish();

        let connection = outcome?;
        slot.connection = Some(Arc::clone(&connection));
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok((slot.generation, connection))
    }

    /// Mark the client permanently failed
    async fn give_up(&self, attempts: u32) {
        ReconnectEvent::Exhausted {
            total_attempts: attempts,
        }
        .log(&self.endpoint);
        self.status.set(ConnectionStatus::Errored);

        let stale = self.slot.lock().await.connection.take();
        if let Some(stale) = stale {
            let _ = stale.close().await;
        }
    }
}

/// Raises the reconnecting flag until the reconnect finishes or is dropped
///
/// A caller cancelled mid-connect leaves the slot empty; the next command
/// sees no live client and reconnects from there.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self {
            flag,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("reconnect cancelled before the client was replaced");
        }
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for ReconnectingConnection {
    fn backend_name(&self) -> &str {
        &self.backend_name
    }

    async fn execute(&self, command: &str, args: &[Value]) -> Result<Value> {
        if self.is_closed() {
            return Err(KvError::Connection(format!(
                "connection is {}",
                self.status()
            )));
        }

        let (mut generation, mut connection) = self.current().await?;
        let mut attempt = 0u32;

        loop {
            let err = match &connection {
                Some(client) => match client.execute(command, args).await {
                    Ok(value) => return Ok(value),
                    Err(err) => err,
                },
                None => KvError::Connection("no live client".into()),
            };

            let delay = if err.is_read_only() {
                Duration::ZERO
            } else if err.is_connection_error() {
                self.config.backoff().calculate_delay(attempt)
            } else {
                return Err(err);
            };

            if attempt >= self.config.max_attempts() {
                self.give_up(attempt).await;
                return Err(err);
            }

            ReconnectEvent::Attempting {
                attempt: attempt + 1,
                max_attempts: self.config.max_attempts(),
                delay,
            }
            .log(&self.endpoint);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.is_closed() {
                return Err(err);
            }

            attempt += 1;
            match self.reconnect(generation).await {
                Ok((next_generation, client)) => {
                    ReconnectEvent::Succeeded {
                        attempts_taken: attempt,
                    }
                    .log(&self.endpoint);
                    generation = next_generation;
                    connection = Some(client);
                }
                Err(reconnect_err) => {
                    ReconnectEvent::Failed {
                        attempt,
                        error: reconnect_err.to_string(),
                    }
                    .log(&self.endpoint);
                    generation = self.slot.lock().await.generation;
                    connection = None;
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.status.set(ConnectionStatus::Closing);
        let stale = self.slot.lock().await.connection.take();
        let result = match stale {
            Some(client) => client.close().await,
            None => Ok(()),
        };
        self.status.set(ConnectionStatus::Closed);
        result
    }

    fn status_cell(&self) -> &StatusCell {
        &self.status
    }
}

/// Connector that wraps every client it opens in a [`ReconnectingConnection`]
pub struct ReconnectingConnector<C> {
    inner: Arc<C>,
    config: ReconnectConfig,
}

impl<C: Connector> ReconnectingConnector<C> {
    pub fn new(inner: C, config: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(inner),
            config,
        }
    }

    /// Get the reconnect configuration applied to each client
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }
}

#[async_trait]
impl<C: Connector> Connector for ReconnectingConnector<C> {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Connection>> {
        let connector: Arc<dyn Connector> = Arc::clone(&self.inner) as Arc<dyn Connector>;
        let connection =
            ReconnectingConnection::connect(connector, endpoint.clone(), self.config.clone())
                .await?;
        Ok(connection as Arc<dyn Connection>)
    }
}
