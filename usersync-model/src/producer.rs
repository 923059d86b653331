//! Synchronous event fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle returned by [`EventProducer::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A one-to-many broadcaster of events to handlers of type `H`.
///
/// Delivery is synchronous: [`fire`](Self::fire) returns only after every
/// handler subscribed at the time of the call has been invoked exactly once.
/// The subscriber list is snapshotted before delivery, so handlers may
/// subscribe or unsubscribe (including themselves) while being notified.
pub struct EventProducer<H: ?Sized> {
    subscribers: Mutex<Vec<(SubscriptionId, Arc<H>)>>,
    next_id: AtomicU64,
}

impl<H: ?Sized> EventProducer<H> {
    /// Creates a producer with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds a handler. The same handler may be subscribed more than once;
    /// each subscription is delivered separately.
    pub fn subscribe(&self, handler: Arc<H>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Removes a subscription. Returns false if it was not present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Invokes `notify` once for every current subscriber.
    pub fn fire(&self, notify: impl Fn(&H)) {
        let snapshot: Vec<Arc<H>> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &snapshot {
            notify(handler);
        }
    }

    /// Number of current subscriptions.
    pub fn len(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: ?Sized> Default for EventProducer<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> std::fmt::Debug for EventProducer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProducer")
            .field("subscribers", &self.len())
            .finish()
    }
}
