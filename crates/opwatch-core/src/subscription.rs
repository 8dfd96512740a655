//! Subscription combinators over the event bus.
//!
//! - [`EventBus::subscribe_all`] - one handler for many event names
//! - [`EventBus::wait_for_match`] - a future for the first matching event
//! - [`EventBus::on_match`] - a handler for the first matching event

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use opwatch_proto::{ChangeEvent, Document};

use crate::bus::{EventBus, ListenerControl, ListenerId};
use crate::error::{Error, Result};

/// A conjunction of `path == value` checks against an event.
///
/// Paths are read with [`ChangeEvent::lookup`], so the first segment names an
/// event field: `changed_path`, `document.status`, `selector._id`, ...
/// An empty predicate matches every event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    entries: Vec<(String, Document)>,
}

impl Predicate {
    /// Create an empty predicate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `path` to equal `value`.
    pub fn with(mut self, path: impl Into<String>, value: impl Into<Document>) -> Self {
        self.entries.push((path.into(), value.into()));
        self
    }

    /// Number of checks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the predicate has no checks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every entry against the event.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.entries.iter().all(|(path, expected)| {
            event
                .lookup(path)
                .is_some_and(|found| found.as_ref() == expected)
        })
    }
}

impl<K: Into<String>, V: Into<Document>> FromIterator<(K, V)> for Predicate {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(path, value)| (path.into(), value.into()))
                .collect(),
        }
    }
}

/// Handle to listeners registered by a combinator.
///
/// Dropping the handle does not remove the listeners; call
/// [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<EventBus>,
    registrations: Vec<(String, ListenerId)>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Remove every listener this handle registered.
    ///
    /// Returns the number removed; calling it again removes nothing.
    pub fn unsubscribe(&self) -> usize {
        if !self.active.swap(false, Ordering::SeqCst) {
            return 0;
        }
        let Some(bus) = self.bus.upgrade() else {
            return 0;
        };
        self.registrations
            .iter()
            .filter(|(name, id)| bus.unsubscribe(name, *id))
            .count()
    }

    /// Whether the listeners are still registered.
    ///
    /// Becomes false after `unsubscribe` or once an `on_match` handler fired.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Event names this handle listens on.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.registrations.iter().map(|(name, _)| name.as_str())
    }
}

/// A pending one-shot match.
///
/// Resolves to the first event that satisfied the predicate. There is no
/// timeout; wrap it in `tokio::time::timeout` if one is needed.
#[derive(Debug)]
pub struct PendingMatch {
    bus: Weak<EventBus>,
    name: String,
    id: ListenerId,
    rx: oneshot::Receiver<Arc<ChangeEvent>>,
}

impl PendingMatch {
    /// Event name being watched.
    pub fn event_name(&self) -> &str {
        &self.name
    }

    /// The listener registered on the bus.
    pub fn listener_id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener without waiting for a match.
    ///
    /// Returns false if it already matched or was removed.
    pub fn cancel(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.unsubscribe(&self.name, self.id))
    }
}

impl Future for PendingMatch {
    type Output = Result<Arc<ChangeEvent>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.map_err(|_| Error::ListenerDropped))
    }
}

impl EventBus {
    /// Register `handler` under each of `names`.
    ///
    /// The handler receives the name it was invoked for along with the event.
    pub fn subscribe_all<I, S, F>(self: &Arc<Self>, names: I, handler: F) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&str, &Arc<ChangeEvent>) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let registrations = names
            .into_iter()
            .map(|name| {
                let name: String = name.into();
                let bound_name = name.clone();
                let handler = Arc::clone(&handler);
                let id = self.subscribe(name.clone(), move |event| handler(bound_name.as_str(), event));
                (name, id)
            })
            .collect();

        Subscription {
            bus: Arc::downgrade(self),
            registrations,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Wait for the first event on `name` that satisfies `predicate`.
    ///
    /// The listener removes itself on the first match and never fires again.
    /// If nothing ever matches it stays registered until cancelled.
    pub fn wait_for_match(self: &Arc<Self>, name: impl Into<String>, predicate: Predicate) -> PendingMatch {
        let name: String = name.into();
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));

        let id = self.subscribe_with_control(name.clone(), move |event| {
            if !predicate.matches(event) {
                return ListenerControl::Keep;
            }
            // Concurrent publishers may both see a match; only one gets the sender.
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(Arc::clone(event));
            }
            ListenerControl::Remove
        });

        PendingMatch {
            bus: Arc::downgrade(self),
            name,
            id,
            rx,
        }
    }

    /// Invoke `handler` for the first event on `name` that satisfies `predicate`.
    ///
    /// The handler runs synchronously inside `publish` and the listener is
    /// removed after that single match.
    pub fn on_match<F>(self: &Arc<Self>, name: impl Into<String>, predicate: Predicate, handler: F) -> Subscription
    where
        F: Fn(&Arc<ChangeEvent>) + Send + Sync + 'static,
    {
        let name: String = name.into();
        let active = Arc::new(AtomicBool::new(true));
        let listener_active = Arc::clone(&active);

        let id = self.subscribe_with_control(name.clone(), move |event| {
            if !predicate.matches(event) {
                return ListenerControl::Keep;
            }
            if listener_active.swap(false, Ordering::SeqCst) {
                handler(event);
            }
            ListenerControl::Remove
        });

        Subscription {
            bus: Arc::downgrade(self),
            registrations: vec![(name, id)],
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::tests::test_event;
    use futures::FutureExt;

    #[test]
    fn test_predicate_matching() {
        let event = test_event("update:db.coll.a", "a");

        assert!(Predicate::new().matches(&event));
        assert!(Predicate::new().with("changed_path", "a").matches(&event));
        assert!(Predicate::new()
            .with("changed_path", "a")
            .with("document_id", 1)
            .matches(&event));
        assert!(!Predicate::new()
            .with("changed_path", "a")
            .with("document_id", 2)
            .matches(&event));
        // Absent fields never match, not even against null.
        assert!(!Predicate::new().with("document", Document::Null).matches(&event));
    }

    #[test]
    fn test_predicate_from_iter() {
        let predicate: Predicate = vec![("changed_path", "a"), ("operation_kind", "update")]
            .into_iter()
            .collect();
        assert_eq!(predicate.len(), 2);
        assert!(predicate.matches(&test_event("update:db.coll.a", "a")));
    }

    #[test]
    fn test_subscribe_all_and_unsubscribe() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let subscription = bus.subscribe_all(["insert:db.a", "delete:db.a"], move |name, event| {
            sink.lock().push((name.to_string(), event.document_id.clone()));
        });

        bus.publish("insert:db.a", test_event("insert:db.a", ""));
        bus.publish("delete:db.a", test_event("delete:db.a", ""));
        bus.publish("update:db.a.x", test_event("update:db.a.x", "x"));

        assert_eq!(
            *seen.lock(),
            vec![
                ("insert:db.a".to_string(), Document::Int(1)),
                ("delete:db.a".to_string(), Document::Int(1)),
            ]
        );
        assert_eq!(subscription.event_names().collect::<Vec<_>>(), vec!["insert:db.a", "delete:db.a"]);

        assert_eq!(subscription.unsubscribe(), 2);
        assert_eq!(subscription.unsubscribe(), 0);
        assert!(!subscription.is_active());
        assert_eq!(bus.total_listeners(), 0);

        bus.publish("insert:db.a", test_event("insert:db.a", ""));
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_match_resolves_once() {
        let bus = Arc::new(EventBus::new());
        let pending = bus.wait_for_match("update:db.coll.a", Predicate::new().with("document_id", 1));

        bus.publish("update:db.coll.a", test_event("update:db.coll.a", "a"));
        let event = pending.await.unwrap();
        assert_eq!(event.changed_path, "a");

        // Listener is gone; further matching events reach nobody.
        assert_eq!(bus.listener_count("update:db.coll.a"), 0);
        assert_eq!(bus.publish("update:db.coll.a", test_event("update:db.coll.a", "a")), 0);
    }

    #[tokio::test]
    async fn test_wait_for_match_skips_non_matching() {
        let bus = Arc::new(EventBus::new());
        let mut pending =
            bus.wait_for_match("update:db.coll.a", Predicate::new().with("changed_path", "b"));

        bus.publish("update:db.coll.a", test_event("update:db.coll.a", "a"));
        assert!((&mut pending).now_or_never().is_none());
        assert_eq!(bus.listener_count("update:db.coll.a"), 1);

        bus.publish("update:db.coll.a", test_event("update:db.coll.a", "b"));
        let event = pending.await.unwrap();
        assert_eq!(event.changed_path, "b");
    }

    #[tokio::test]
    async fn test_wait_for_match_empty_predicate_takes_first() {
        let bus = Arc::new(EventBus::new());
        let pending = bus.wait_for_match("insert:db.coll", Predicate::new());

        bus.publish("insert:db.coll", test_event("insert:db.coll", "first"));
        bus.publish("insert:db.coll", test_event("insert:db.coll", "second"));

        assert_eq!(pending.await.unwrap().changed_path, "first");
    }

    #[tokio::test]
    async fn test_wait_for_match_cancel() {
        let bus = Arc::new(EventBus::new());
        let pending = bus.wait_for_match("insert:db.coll", Predicate::new());
        assert_eq!(pending.event_name(), "insert:db.coll");

        assert!(pending.cancel());
        assert!(!pending.cancel());
        assert!(matches!(pending.await, Err(Error::ListenerDropped)));
    }

    #[tokio::test]
    async fn test_wait_for_match_removed_by_listener_id() {
        let bus = Arc::new(EventBus::new());
        let pending = bus.wait_for_match("delete:db.coll", Predicate::new());

        assert!(bus.unsubscribe("delete:db.coll", pending.listener_id()));
        assert!(!pending.cancel());
        assert_eq!(bus.publish("delete:db.coll", test_event("delete:db.coll", "")), 0);
        assert!(matches!(pending.await, Err(Error::ListenerDropped)));
    }

    #[test]
    fn test_on_match_fires_exactly_once() {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&calls);
        let subscription = bus.on_match(
            "update:db.coll.a",
            Predicate::new().with("changed_path", "a"),
            move |event| sink.lock().push(event.event_name.clone()),
        );

        bus.publish("update:db.coll.a", test_event("update:db.coll.a", "other"));
        assert!(calls.lock().is_empty());
        assert!(subscription.is_active());

        bus.publish("update:db.coll.a", test_event("update:db.coll.a", "a"));
        bus.publish("update:db.coll.a", test_event("update:db.coll.a", "a"));

        assert_eq!(calls.lock().len(), 1);
        assert!(!subscription.is_active());
        assert_eq!(bus.listener_count("update:db.coll.a"), 0);
        assert_eq!(subscription.unsubscribe(), 0);
    }

    #[test]
    fn test_on_match_unsubscribe_before_match() {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&calls);
        let subscription = bus.on_match("insert:db.coll", Predicate::new(), move |_| {
            *counter.lock() += 1;
        });

        assert_eq!(subscription.unsubscribe(), 1);
        bus.publish("insert:db.coll", test_event("insert:db.coll", ""));
        assert_eq!(*calls.lock(), 0);
    }
}
