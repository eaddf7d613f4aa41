//! Publish/subscribe registry used for every event kind the core emits.
//!
//! Subscribers run synchronously in registration order. A failing or
//! panicking subscriber is logged and skipped; the remaining subscribers
//! and the publisher's own control flow are unaffected.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CallbackError;

/// Result returned by event handlers.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler<E> = Arc<dyn Fn(&E) -> HandlerResult + Send + Sync>;

/// Token returned by [`EventHub::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Registry of subscribers for one event kind.
pub struct EventHub<E> {
    name: &'static str,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Handler<E>)>>,
}

impl<E> EventHub<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a handler. Handlers are invoked in registration order.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Deliver `event` to every subscriber. Returns the number of handlers
    /// that failed.
    pub fn publish(&self, event: &E) -> usize {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<(SubscriptionId, Handler<E>)> = self.subscribers.read().clone();
        let mut failures = 0;

        for (id, handler) in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => CallbackError::Failed {
                    hub: self.name,
                    subscriber: id.0,
                    message: e.to_string(),
                },
                Err(_) => CallbackError::Panicked {
                    hub: self.name,
                    subscriber: id.0,
                },
            };
            tracing::warn!(error = %failure, "event subscriber failed");
            failures += 1;
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn publish_runs_in_registration_order() {
        let hub = EventHub::<u32>::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            hub.subscribe(move |v: &u32| {
                seen.lock().push(format!("{tag}{v}"));
                Ok(())
            });
        }

        assert_eq!(hub.publish(&7), 0);
        assert_eq!(*seen.lock(), vec!["a7", "b7", "c7"]);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let hub = EventHub::<()>::new("test");
        let id = hub.subscribe(|_| Ok(()));
        assert_eq!(hub.len(), 1);
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert!(hub.is_empty());
    }

    #[test]
    fn handler_may_subscribe_during_publish() {
        let hub = Arc::new(EventHub::<()>::new("test"));
        let inner = hub.clone();
        hub.subscribe(move |_| {
            inner.subscribe(|_| Ok(()));
            Ok(())
        });

        hub.publish(&());
        assert_eq!(hub.len(), 2);
    }
}
