//! # Context Signal
//!
//! Fan-out of [`ContextLoaded`] notifications to subscribers.
//!
//! ```text
//! Stage::load_context ──broadcast──> [Sender] ──> Subscription (registry A)
//!                                    [Sender] ──> Subscription (registry B)
//! ```
//!
//! Each subscriber gets its own unbounded channel. Dropping a
//! [`Subscription`] unsubscribes it, so a registry's subscription lifetime
//! is exactly its activation lifetime.

use std::sync::{Arc, Weak};

use crossbeam_channel::{unbounded, Receiver, Sender, TryIter};
use parking_lot::Mutex;
use spawnpool_shared::ContextLoaded;

type SubscriberList = Mutex<Vec<(u64, Sender<ContextLoaded>)>>;

/// Broadcast source for context-switch notifications.
#[derive(Debug, Default)]
pub struct ContextSignal {
    subscribers: Arc<SubscriberList>,
    next_id: Mutex<u64>,
}

impl ContextSignal {
    /// Creates a signal with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        let (tx, rx) = unbounded();
        self.subscribers.lock().push((id, tx));
        Subscription {
            id,
            receiver: rx,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Delivers `event` to every subscriber, returning how many received it.
    ///
    /// Subscribers whose receiving end is gone are dropped from the list.
    pub fn broadcast(&self, event: &ContextLoaded) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// A registered listener. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: Receiver<ContextLoaded>,
    subscribers: Weak<SubscriberList>,
}

impl Subscription {
    /// Drains notifications delivered so far without blocking.
    pub fn pending(&self) -> TryIter<'_, ContextLoaded> {
        self.receiver.try_iter()
    }

    /// Number of notifications waiting to be drained.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Removes this subscriber from its signal.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawnpool_shared::LoadMode;

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let signal = ContextSignal::new();
        let a = signal.subscribe();
        let b = signal.subscribe();

        let delivered = signal.broadcast(&ContextLoaded::new("level_01", LoadMode::Single));

        assert_eq!(delivered, 2);
        assert_eq!(a.pending().count(), 1);
        assert_eq!(b.pending_count(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let signal = ContextSignal::new();
        let sub = signal.subscribe();
        assert_eq!(signal.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(signal.subscriber_count(), 0);
        assert_eq!(signal.broadcast(&ContextLoaded::new("x", LoadMode::Additive)), 0);
    }

    #[test]
    fn test_subscription_outlives_signal() {
        let sub = {
            let signal = ContextSignal::new();
            signal.subscribe()
        };
        assert_eq!(sub.pending_count(), 0);
        drop(sub);
    }
}
