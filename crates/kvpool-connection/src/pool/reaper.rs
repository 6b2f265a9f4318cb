//! Idle reaper
//!
//! Every time a connection is returned to `available`, a timer is armed for
//! the idle timeout. When it fires, the connection is closed if it has sat
//! idle since that very release and the pool is above its minimum size.
//! Re-acquiring a connection does not cancel its timer; the timer finds a
//! different idle epoch and does nothing.

use std::sync::{Arc, Weak};

use super::lifecycle::{EvictionReason, spawn_background, terminate};
use super::pool::PoolInner;
use super::state::ConnectionId;

impl PoolInner {
    pub(super) fn arm_idle_timer(self: &Arc<Self>, id: ConnectionId, epoch: u64) {
        let idle_timeout = self.config.idle_timeout();
        let pool: Weak<PoolInner> = Arc::downgrade(self);

        spawn_background(async move {
            tokio::time::sleep(idle_timeout).await;
            if let Some(pool) = pool.upgrade() {
                pool.reap_idle(id, epoch);
            }
        });
    }

    /// Close the connection if it is still idle from the given release and
    /// the pool can shrink. Returns whether it was closed.
    pub(super) fn reap_idle(&self, id: ConnectionId, epoch: u64) -> bool {
        let entry = {
            let mut state = self.state.lock();
            if state.closed
                || !state.is_idle_since(id, epoch)
                || state.total() <= self.config.min_connections()
            {
                return false;
            }
            state.remove(id)
        };

        match entry {
            Some(entry) => {
                tracing::debug!(
                    connection_id = %id,
                    reason = EvictionReason::Idle.as_str(),
                    age_ms = entry.created_at.elapsed().as_millis() as u64,
                    "closing idle connection"
                );
                terminate(entry.connection);
                true
            }
            None => false,
        }
    }
}
