//! FIFO queue of acquire requests waiting on a saturated pool

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kvpool_core::{Connection, Result};
use tokio::sync::oneshot;

use super::state::ConnectionId;

/// What a waiter is resumed with: a connection handed off by `release`,
/// or the reason it never will be.
pub(super) type Delivery = Result<(ConnectionId, Arc<dyn Connection>)>;

/// A pending acquire request
pub(super) struct Waiter {
    id: u64,
    enqueued_at: Instant,
    sender: oneshot::Sender<Delivery>,
}

impl Waiter {
    pub(super) fn id(&self) -> u64 {
        self.id
    }

    /// How long this request has been queued
    pub(super) fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Resume the waiter. Gives the delivery back if the waiter is gone.
    pub(super) fn deliver(self, delivery: Delivery) -> std::result::Result<(), Delivery> {
        self.sender.send(delivery)
    }
}

/// Waiters ordered by arrival
#[derive(Default)]
pub(super) struct WaitQueue {
    entries: VecDeque<Waiter>,
    next_id: u64,
}

impl WaitQueue {
    /// Enqueue a new waiter at the back
    pub(super) fn push(&mut self) -> (u64, oneshot::Receiver<Delivery>) {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(Waiter {
            id,
            enqueued_at: Instant::now(),
            sender,
        });
        (id, receiver)
    }

    /// Take the oldest waiter that is still listening
    pub(super) fn pop_front(&mut self) -> Option<Waiter> {
        while let Some(waiter) = self.entries.pop_front() {
            if !waiter.sender.is_closed() {
                return Some(waiter);
            }
        }
        None
    }

    /// Remove a waiter by id. Returns false if it was already taken.
    pub(super) fn remove(&mut self, id: u64) -> bool {
        match self.entries.iter().position(|w| w.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Take every waiter, oldest first
    pub(super) fn drain(&mut self) -> Vec<Waiter> {
        self.entries.drain(..).collect()
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvpool_core::KvError;

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = WaitQueue::default();
        let (first, _rx1) = queue.push();
        let (second, _rx2) = queue.push();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front().map(|w| w.id()), Some(first));
        assert_eq!(queue.pop_front().map(|w| w.id()), Some(second));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_skips_abandoned_waiters() {
        let mut queue = WaitQueue::default();
        let (_, rx1) = queue.push();
        let (second, _rx2) = queue.push();
        drop(rx1);

        assert_eq!(queue.pop_front().map(|w| w.id()), Some(second));
    }

    #[test]
    fn test_remove_by_id() {
        let mut queue = WaitQueue::default();
        let (first, _rx1) = queue.push();
        let (second, _rx2) = queue.push();

        assert!(queue.remove(first));
        assert!(!queue.remove(first));
        assert_eq!(queue.pop_front().map(|w| w.id()), Some(second));
    }

    #[test]
    fn test_deliver_reaches_receiver() {
        let mut queue = WaitQueue::default();
        let (_, mut rx) = queue.push();
        let waiter = queue.pop_front().expect("waiter queued");
        assert!(waiter.deliver(Err(KvError::PoolClosed)).is_ok());
        assert!(matches!(rx.try_recv(), Ok(Err(KvError::PoolClosed))));
    }
}
