//! Synchronous publish/subscribe
//!
//! Handlers are registered per event type, or for every event type with
//! the `"*"` wildcard. Notification runs the matching handlers in the
//! order they were registered, on the caller's thread, before returning.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde_json::Value;

/// Event type matching every notification
pub const WILDCARD: &str = "*";

pub const TOKEN_CREATED: &str = "tokenCreated";
pub const TOKEN_UPDATED: &str = "tokenUpdated";
pub const TOKENS_CLEARED: &str = "tokensCleared";

/// A delivered notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    pub payload: Value,
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Listener {
    id: u64,
    event_type: String,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<Listener>,
}

/// Registry of event handlers
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `event_type` (or `"*"`)
    pub fn subscribe<F>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push(Listener {
            id,
            event_type: event_type.into(),
            handler: Arc::new(handler),
        });

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event, returning how many handlers ran
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe while running; changes apply to the next notification.
    pub fn notify(&self, event_type: &str, payload: Value) -> usize {
        let handlers: Vec<Handler> = self
            .lock()
            .listeners
            .iter()
            .filter(|l| l.event_type == event_type || l.event_type == WILDCARD)
            .map(|l| Arc::clone(&l.handler))
            .collect();

        let event = Event {
            event_type: event_type.to_string(),
            payload,
        };
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Number of registered handlers
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

/// Handle returned by `subscribe`
///
/// Dropping it keeps the handler registered; call `unsubscribe` to remove it.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove exactly this handler; false if it was already gone
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = registry.listeners.len();
        registry.listeners.retain(|l| l.id != self.id);
        registry.listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_notify() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let _sub = bus.subscribe(TOKEN_CREATED, move |event| {
            assert_eq!(event.event_type, TOKEN_CREATED);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.notify(TOKEN_CREATED, json!({})), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Other event types do not reach it
        assert_eq!(bus.notify("somethingElse", json!({})), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = calls.clone();
        let first = bus.subscribe(TOKEN_CREATED, move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        let b = calls.clone();
        let _second = bus.subscribe(TOKEN_CREATED, move |_| {
            b.fetch_add(10, Ordering::SeqCst);
        });

        bus.notify(TOKEN_CREATED, json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 11);

        assert!(first.unsubscribe());
        bus.notify(TOKEN_CREATED, json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 21);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn test_wildcard_receives_everything() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        bus.subscribe(WILDCARD, move |event| {
            log.lock().unwrap().push(event.event_type.clone());
        });

        bus.notify("anyEvent", json!(1));
        bus.notify(TOKEN_CREATED, json!(2));

        assert_eq!(*seen.lock().unwrap(), vec!["anyEvent", TOKEN_CREATED]);
    }

    #[test]
    fn test_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let log = order.clone();
        bus.subscribe(TOKEN_CREATED, move |_| log.lock().unwrap().push("specific-1"));
        let log = order.clone();
        bus.subscribe(WILDCARD, move |_| log.lock().unwrap().push("wildcard"));
        let log = order.clone();
        bus.subscribe(TOKEN_CREATED, move |_| log.lock().unwrap().push("specific-2"));

        bus.notify(TOKEN_CREATED, json!(null));
        assert_eq!(
            *order.lock().unwrap(),
            vec!["specific-1", "wildcard", "specific-2"]
        );
    }

    #[test]
    fn test_handler_can_subscribe_during_dispatch() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();

        bus.subscribe(TOKEN_CREATED, move |_| {
            inner_bus.subscribe(TOKEN_UPDATED, |_| {});
        });

        // Would deadlock if the registry lock were held while dispatching
        assert_eq!(bus.notify(TOKEN_CREATED, json!({})), 1);
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn test_payload_is_delivered() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(None));

        let slot = received.clone();
        bus.subscribe(TOKEN_CREATED, move |event| {
            *slot.lock().unwrap() = Some(event.payload.clone());
        });

        bus.notify(TOKEN_CREATED, json!({"tokenId": "token_1"}));
        assert_eq!(
            *received.lock().unwrap(),
            Some(json!({"tokenId": "token_1"}))
        );
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = EventBus::new();
        let sub = bus.subscribe(TOKEN_CREATED, |_| {});
        drop(bus);
        assert!(!sub.unsubscribe());
    }
}
