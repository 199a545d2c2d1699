//! Inbound message fan-out.
//!
//! Subscribers are called synchronously, in registration order, on the task
//! that received the message. A subscriber that errors or panics is logged
//! and skipped, the rest still receive the message.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use convoy_schemas::ConvoyMessage;
use parking_lot::RwLock;
use tracing::{error, warn};

type Callback = Arc<dyn Fn(&ConvoyMessage) -> anyhow::Result<()> + Send + Sync>;

/// Callbacks that receive every inbound message.
#[derive(Default)]
pub struct SubscriberSet {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Callback)>>,
}

impl std::fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("len", &self.len())
            .finish()
    }
}

impl SubscriberSet {
    /// Create an empty set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a callback and return its handle.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&ConvoyMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, Arc::new(callback)));
        Subscription {
            id,
            set: Arc::downgrade(self),
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every callback.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Deliver `message` to every subscriber. Returns how many accepted it.
    pub fn dispatch(&self, message: &ConvoyMessage) -> usize {
        // Callbacks may subscribe or unsubscribe, so call them outside the lock.
        let callbacks: Vec<(u64, Callback)> = self.entries.read().clone();
        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(subscriber = id, kind = %message.kind(), error = %e, "Subscriber failed");
                }
                Err(_) => {
                    error!(subscriber = id, kind = %message.kind(), "Subscriber panicked");
                }
            }
        }
        delivered
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }
}

/// Handle returned by [`SubscriberSet::subscribe`]. Dropping it keeps the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    set: Weak<SubscriberSet>,
}

impl Subscription {
    /// Identifier of this subscription.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop receiving messages. Returns false if already removed.
    pub fn unsubscribe(self) -> bool {
        self.set.upgrade().is_some_and(|set| set.remove(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_schemas::{DeviceRole, Payload, RangeUpdate};
    use std::sync::atomic::AtomicUsize;

    fn message() -> ConvoyMessage {
        ConvoyMessage::from_device(
            DeviceRole::LEAD_MAIN,
            Payload::Range(RangeUpdate {
                remaining_range: 400.0,
            }),
        )
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let set = SubscriberSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let before = hits.clone();
        let _a = set.subscribe(move |_| {
            before.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let _b = set.subscribe(|_| Err(anyhow::anyhow!("boom")));
        let _c = set.subscribe(|_| panic!("subscriber bug"));
        let after = hits.clone();
        let _d = set.subscribe(move |_| {
            after.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(set.dispatch(&message()), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let set = SubscriberSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let subscription = set.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        set.dispatch(&message());
        assert!(subscription.unsubscribe());
        set.dispatch(&message());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_subscriber_can_subscribe_during_dispatch() {
        let set = SubscriberSet::new();
        let inner = set.clone();
        let _outer = set.subscribe(move |_| {
            let _nested = inner.subscribe(|_| Ok(()));
            Ok(())
        });
        assert_eq!(set.dispatch(&message()), 1);
        assert_eq!(set.len(), 2);
    }
}
