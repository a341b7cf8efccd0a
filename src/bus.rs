//! In-process change notifications.
//!
//! Topic-based publish/subscribe used for UI invalidation. Handlers are
//! registered per topic and invoked synchronously in registration order;
//! async consumers can additionally [`listen`](NotificationBus::listen) on a
//! broadcast channel. Nothing is persisted: events published before a
//! restart are gone after it.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::constants::EVENT_CHANNEL_CAPACITY;

/// Notification topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    PinsChanged,
    ColorTableReloaded,
    RecenterMap,
}

/// Event published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Pin rows were created, updated or deleted.
    PinsChanged,
    /// A color descriptor changed.
    ColorTableReloaded,
    /// The map should center on the given coordinate.
    RecenterMap { latitude: f64, longitude: f64 },
}

impl Event {
    /// Topic this event is delivered on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::PinsChanged => Topic::PinsChanged,
            Self::ColorTableReloaded => Topic::ColorTableReloaded,
            Self::RecenterMap { .. } => Topic::RecenterMap,
        }
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registry {
    next_id: u64,
    // Ordered by id, so iteration follows registration order.
    handlers: BTreeMap<SubscriptionId, (Topic, Handler)>,
}

/// Process-wide notification bus.
pub struct NotificationBus {
    registry: RwLock<Registry>,
    sender: broadcast::Sender<Event>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                next_id: 0,
                handlers: BTreeMap::new(),
            }),
            sender: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
        }
    }

    /// Register `handler` for `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.handlers.insert(id, (topic, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.write().handlers.remove(&id).is_some()
    }

    /// Receive every published event on a broadcast channel.
    pub fn listen(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish `event`; fire-and-forget.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic();

        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<Handler> = self
            .registry
            .read()
            .handlers
            .values()
            .filter(|(t, _)| *t == topic)
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in &handlers {
            handler(&event);
        }

        // No listeners is fine.
        let _ = self.sender.send(event);
        trace!(?topic, handlers = handlers.len(), "Published notification");
        handlers.len()
    }

    /// Number of handlers registered for `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.registry
            .read()
            .handlers
            .values()
            .filter(|(t, _)| *t == topic)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_handlers_invoked_in_registration_order() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(Topic::PinsChanged, move |_| seen.lock().push(label));
        }

        assert_eq!(bus.publish(Event::PinsChanged), 3);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_topics_are_isolated() {
        let bus = NotificationBus::new();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(Topic::ColorTableReloaded, move |_| *h.lock() += 1);

        assert_eq!(bus.publish(Event::PinsChanged), 0);
        assert_eq!(bus.publish(Event::ColorTableReloaded), 1);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = NotificationBus::new();
        let id = bus.subscribe(Topic::PinsChanged, |_| {});
        assert_eq!(bus.subscriber_count(Topic::PinsChanged), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(Event::PinsChanged), 0);
    }

    #[test]
    fn test_handler_can_subscribe_during_publish() {
        let bus = Arc::new(NotificationBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(Topic::PinsChanged, move |_| {
            inner.subscribe(Topic::RecenterMap, |_| {});
        });

        bus.publish(Event::PinsChanged);
        assert_eq!(bus.subscriber_count(Topic::RecenterMap), 1);
    }

    #[tokio::test]
    async fn test_listen_receives_payload() {
        let bus = NotificationBus::new();
        let mut rx = bus.listen();

        bus.publish(Event::RecenterMap {
            latitude: 64.1,
            longitude: -21.9,
        });

        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            Event::RecenterMap {
                latitude: 64.1,
                longitude: -21.9
            }
        );
        assert_eq!(event.topic(), Topic::RecenterMap);
    }
}
