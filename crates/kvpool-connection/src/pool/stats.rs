//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's state
///
/// Taken under the pool lock, so `available + in_use == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Total number of live connections (available + in use)
    total: usize,
    /// Number of idle connections ready to be acquired
    available: usize,
    /// Number of connections currently checked out
    in_use: usize,
    /// Number of acquire requests queued behind a saturated pool
    waiting: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub fn new(total: usize, available: usize, in_use: usize, waiting: usize) -> Self {
        Self {
            total,
            available,
            in_use,
            waiting,
        }
    }

    /// Get the total number of connections
    pub fn total(&self) -> usize {
        self.total
    }

    /// Get the number of idle connections
    pub fn available(&self) -> usize {
        self.available
    }

    /// Get the number of checked-out connections
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Get the number of waiting requests
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Calculate pool utilization as a fraction (0.0 to 1.0)
    ///
    /// Returns 0.0 if total is 0 to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.in_use as f64 / self.total as f64
        }
    }

    /// Check if the pool is fully utilized (all connections in use)
    pub fn is_full(&self) -> bool {
        self.available == 0 && self.total > 0
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}
