//! Redis connector and connection implementation

use std::sync::Arc;

use async_trait::async_trait;
use kvpool_core::{
    Connection, ConnectionStatus, Connector, Endpoint, KvError, Result, StatusCell, Value,
};
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;

/// Opens connections to a Redis server
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl RedisConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for RedisConnector {
    fn id(&self) -> &'static str {
        "redis"
    }

    #[tracing::instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Connection>> {
        tracing::debug!("connecting to Redis");

        let client = redis::Client::open(endpoint.to_url().as_str())
            .map_err(|e| KvError::Configuration(format!("Invalid Redis endpoint: {}", e)))?;

        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| KvError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        // Authentication errors only surface on the first command
        let ping: redis::RedisResult<String> =
            redis::cmd("PING").query_async(&mut connection).await;

        match ping {
            Ok(response) => {
                if response != "PONG" {
                    tracing::warn!("Unexpected PING response: {}", response);
                }
                tracing::debug!("Redis connection verified with PING");
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("NOAUTH") || message.contains("WRONGPASS") {
                    return Err(KvError::Creation(format!(
                        "Redis authentication failed for {}: {}",
                        endpoint, message
                    )));
                }
                return Err(map_redis_error(e));
            }
        }

        Ok(Arc::new(RedisConnection::new(connection, endpoint.database)))
    }
}

/// A multiplexed Redis connection
///
/// The underlying handle is cheap to clone; each command works on its own
/// clone so no lock is held while a request is in flight.
pub struct RedisConnection {
    connection: Mutex<Option<MultiplexedConnection>>,
    database: u16,
    status: StatusCell,
}

impl RedisConnection {
    pub fn new(connection: MultiplexedConnection, database: u16) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
            database,
            status: StatusCell::new(ConnectionStatus::Ready),
        }
    }

    /// Logical database this connection selected
    pub fn database(&self) -> u16 {
        self.database
    }

    fn handle(&self) -> Result<MultiplexedConnection> {
        self.connection
            .lock()
            .clone()
            .ok_or_else(|| KvError::Connection(format!("Connection is {}", self.status())))
    }
}

#[async_trait]
impl Connection for RedisConnection {
    fn backend_name(&self) -> &str {
        "redis"
    }

    async fn execute(&self, command: &str, args: &[Value]) -> Result<Value> {
        let mut connection = self.handle()?;
        let cmd = build_command(command, args)?;
        let start = std::time::Instant::now();

        let result: redis::RedisResult<redis::Value> = cmd.query_async(&mut connection).await;

        match result {
            Ok(value) => {
                tracing::trace!(
                    command = %command,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "command completed"
                );
                redis_value_to_value(&value)
            }
            Err(e) => {
                let error = map_redis_error(e);
                if error.is_connection_error() {
                    tracing::warn!(error = %error, "Redis connection lost");
                    self.status.set(ConnectionStatus::Errored);
                }
                Err(error)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.status.set(ConnectionStatus::Closing);
        // Dropping the last handle shuts the multiplexer down
        self.connection.lock().take();
        self.status.set(ConnectionStatus::Closed);
        tracing::debug!("Redis connection closed");
        Ok(())
    }

    fn status_cell(&self) -> &StatusCell {
        &self.status
    }
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("database", &self.database)
            .field("status", &self.status())
            .finish()
    }
}

/// Build a command from an inline command string plus extra arguments
///
/// The first word is the command name; remaining words and then `args`
/// are appended in order.
pub(crate) fn build_command(command: &str, args: &[Value]) -> Result<redis::Cmd> {
    let mut parts = command.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| KvError::Command("Empty command".to_string()))?;

    let mut cmd = redis::cmd(&name.to_uppercase());
    for part in parts {
        cmd.arg(part);
    }
    for arg in args {
        push_arg(&mut cmd, arg);
    }
    Ok(cmd)
}

fn push_arg(cmd: &mut redis::Cmd, value: &Value) {
    match value {
        Value::String(s) => {
            cmd.arg(s.as_str());
        }
        Value::Int64(n) => {
            cmd.arg(*n);
        }
        Value::Float64(f) => {
            cmd.arg(*f);
        }
        Value::Bool(b) => {
            cmd.arg(if *b { "1" } else { "0" });
        }
        Value::Bytes(b) => {
            cmd.arg(b.as_slice());
        }
        Value::Null => {
            cmd.arg("");
        }
        Value::Array(items) => {
            for item in items {
                push_arg(cmd, item);
            }
        }
    }
}

/// Classify a Redis error
///
/// `READONLY` replies mean the node was demoted during a failover; I/O,
/// refused, dropped and timed-out links are connection errors; everything
/// else is the command's fault.
pub(crate) fn map_redis_error(error: redis::RedisError) -> KvError {
    if error.kind() == redis::ErrorKind::ReadOnly || error.code() == Some("READONLY") {
        return KvError::ReadOnly(error.to_string());
    }
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
    {
        return KvError::Connection(error.to_string());
    }
    KvError::Command(error.to_string())
}

/// Convert a Redis reply to a [`Value`]
///
/// An error reply anywhere in the tree, such as one slot of an `EXEC`
/// result, fails the whole conversion with the classified error.
pub(crate) fn redis_value_to_value(value: &redis::Value) -> Result<Value> {
    let converted = match value {
        redis::Value::Nil => Value::Null,
        redis::Value::Int(n) => Value::Int64(*n),
        redis::Value::BulkString(data) => match std::str::from_utf8(data) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::Bytes(data.clone()),
        },
        redis::Value::Okay => Value::String("OK".to_string()),
        redis::Value::SimpleString(s) => Value::String(s.clone()),
        redis::Value::Double(d) => Value::Float64(*d),
        redis::Value::Boolean(b) => Value::Bool(*b),
        redis::Value::Array(items) | redis::Value::Set(items) => Value::Array(
            items
                .iter()
                .map(redis_value_to_value)
                .collect::<Result<_>>()?,
        ),
        redis::Value::Push { kind: _, data } => Value::Array(
            data.iter()
                .map(redis_value_to_value)
                .collect::<Result<_>>()?,
        ),
        // Flattened to [k1, v1, k2, v2, ...] like a RESP2 HGETALL reply
        redis::Value::Map(pairs) => {
            let mut flat = Vec::with_capacity(pairs.len() * 2);
            for (k, v) in pairs {
                flat.push(redis_value_to_value(k)?);
                flat.push(redis_value_to_value(v)?);
            }
            Value::Array(flat)
        }
        redis::Value::Attribute {
            data,
            attributes: _,
        } => return redis_value_to_value(data),
        redis::Value::BigNumber(bn) => Value::String(format!("{:?}", bn)),
        redis::Value::VerbatimString { format: _, text } => Value::String(text.clone()),
        redis::Value::ServerError(err) => {
            return Err(map_redis_error(redis::RedisError::from(err.clone())));
        }
        _ => Value::Null,
    };
    Ok(converted)
}
