//! Redis connector for KVPool
//!
//! Opens multiplexed async connections with the `redis` crate, verifies
//! each one with a PING before handing it to the pool, and maps Redis
//! failures onto the shared error taxonomy so the reconnect layer can tell
//! a dropped link from a failover from a bad command.

mod driver;
#[cfg(test)]
mod driver_tests;

pub use driver::*;
