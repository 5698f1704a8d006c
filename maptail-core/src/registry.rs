//! Registry of live subscribers and per-subscriber delivery

use crate::event::Event;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identifier of one registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<Event>,
    dropped: u64,
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the event was queued for
    pub delivered: usize,
    /// Subscribers whose queue was full; the event was dropped for them
    pub dropped: usize,
    /// Subscribers found disconnected and removed
    pub removed: usize,
}

/// Set of currently connected subscribers.
///
/// Each subscriber owns a bounded queue. A broadcast never waits on a slow
/// subscriber: a full queue loses that one event, a closed queue is removed.
pub struct SubscriberRegistry {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl SubscriberRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Registers a new subscriber and returns its id and receiving end
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<Event>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.queue_capacity);

        let mut subscribers = self.lock();
        subscribers.push(Subscriber {
            id,
            sender,
            dropped: 0,
        });
        debug!("Registered subscriber {} ({} connected)", id, subscribers.len());

        (id, receiver)
    }

    /// Removes a subscriber. Returns false if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!("Unregistered subscriber {} ({} connected)", id, subscribers.len());
        }
        removed
    }

    /// Queues the event for every subscriber in registration order
    pub fn broadcast(&self, event: &Event) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut subscribers = self.lock();

        subscribers.retain_mut(|subscriber| match subscriber.sender.try_send(event.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                subscriber.dropped += 1;
                report.dropped += 1;
                warn!(
                    "Subscriber {} is not keeping up, dropped event ({} dropped so far)",
                    subscriber.id, subscriber.dropped
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Subscriber {} disconnected", subscriber.id);
                report.removed += 1;
                false
            }
        });

        report
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.lock().iter().any(|s| s.id == id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_preserves_order() {
        let registry = SubscriberRegistry::new(8);
        let (_a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        for line in ["one", "two", "three"] {
            let report = registry.broadcast(&Event::log(line));
            assert_eq!(report.delivered, 2);
        }

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.try_recv().unwrap(), Event::log("one"));
            assert_eq!(rx.try_recv().unwrap(), Event::log("two"));
            assert_eq!(rx.try_recv().unwrap(), Event::log("three"));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = SubscriberRegistry::new(4);
        let (id, _rx) = registry.register();
        let (other, mut rx_other) = registry.register();

        assert!(registry.contains(id));
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(!registry.unregister(SubscriberId(999)));
        assert!(registry.contains(other));
        assert_eq!(registry.len(), 1);

        let report = registry.broadcast(&Event::log("still here"));
        assert_eq!(report.delivered, 1);
        assert_eq!(rx_other.try_recv().unwrap(), Event::log("still here"));
    }

    #[test]
    fn test_closed_receiver_removed() {
        let registry = SubscriberRegistry::new(4);
        let (gone, rx) = registry.register();
        let (kept, _rx_kept) = registry.register();
        drop(rx);

        let report = registry.broadcast(&Event::log("x"));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert!(!registry.contains(gone));
        assert!(registry.contains(kept));
    }

    #[test]
    fn test_full_queue_drops_event_only() {
        let registry = SubscriberRegistry::new(1);
        let (slow, mut rx_slow) = registry.register();

        assert_eq!(registry.broadcast(&Event::log("first")).delivered, 1);
        let report = registry.broadcast(&Event::log("second"));
        assert_eq!(report.dropped, 1);
        assert!(registry.contains(slow));

        assert_eq!(rx_slow.try_recv().unwrap(), Event::log("first"));
        assert!(rx_slow.try_recv().is_err());

        // Room again, delivery resumes
        assert_eq!(registry.broadcast(&Event::log("third")).delivered, 1);
        assert_eq!(rx_slow.try_recv().unwrap(), Event::log("third"));
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let registry = SubscriberRegistry::new(4);
        registry.broadcast(&Event::log("before"));

        let (_id, mut rx) = registry.register();
        registry.broadcast(&Event::log("after"));

        assert_eq!(rx.try_recv().unwrap(), Event::log("after"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = SubscriberRegistry::new(1);
        let (a, _ra) = registry.register();
        let (b, _rb) = registry.register();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }
}
