//! Health probing for pooled connections
//!
//! A health check sends `PING` over a connection under a timeout and classifies
//! the round-trip latency.
//!
//! # Example
//!
//! ```ignore
//! use kvpool_connection::health::{HealthStatus, ping_connection};
//!
//! let conn = pool.acquire().await?;
//! let latency = ping_connection(&*conn, Duration::from_secs(1)).await?;
//! println!("{:?}", HealthStatus::from_latency(latency));
//! ```

mod ping;
mod status;


pub use ping::{PingError, PingResult, ping_connection};
pub use status::{HealthStatus, HealthThresholds};
