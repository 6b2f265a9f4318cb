//! KVPool Core - Core abstractions shared by the pool and its backends
//!
//! This crate provides the fundamental traits and types that all other
//! KVPool crates depend on. It defines:
//!
//! - `Connector` - Trait for backends that open connections to an endpoint
//! - `Connection` - Trait for a single live link to the key-value service
//! - `ConnectionStatus` / `StatusCell` - Observable connection lifecycle state
//! - `Endpoint` - Where and how to connect
//! - Common types like `Value` and the `KvError` taxonomy

mod connection;
mod driver;
mod endpoint;
mod error;
mod status;
mod types;

pub use connection::*;
pub use driver::*;
pub use endpoint::*;
pub use error::*;
pub use status::*;
pub use types::*;
