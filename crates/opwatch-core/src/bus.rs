//! Name-addressed event bus.
//!
//! Listeners are registered under exact event names and invoked
//! synchronously, in registration order, on the task that publishes. The
//! listener table is snapshotted before delivery, so a listener may subscribe
//! or unsubscribe (itself included) while it runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use opwatch_proto::ChangeEvent;

/// Identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// The raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// What the bus should do with a listener after invoking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerControl {
    /// Keep the listener registered.
    Keep,
    /// Remove the listener.
    Remove,
}

type ListenerFn = dyn Fn(&Arc<ChangeEvent>) -> ListenerControl + Send + Sync;

struct Registration {
    id: ListenerId,
    listener: Arc<ListenerFn>,
}

/// Event bus for change events.
pub struct EventBus {
    /// Listeners keyed by event name, in registration order.
    listeners: RwLock<HashMap<String, Vec<Registration>>>,
    /// Next listener ID.
    next_listener_id: AtomicU64,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for an event name.
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Arc<ChangeEvent>) + Send + Sync + 'static,
    {
        self.subscribe_with_control(name, move |event| {
            handler(event);
            ListenerControl::Keep
        })
    }

    /// Register a listener that decides after each event whether it stays.
    pub fn subscribe_with_control<F>(&self, name: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Arc<ChangeEvent>) -> ListenerControl + Send + Sync + 'static,
    {
        let name: String = name.into();
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));

        self.listeners
            .write()
            .entry(name.clone())
            .or_default()
            .push(Registration {
                id,
                listener: Arc::new(listener),
            });

        tracing::debug!(listener_id = id.get(), event = %name, "listener registered");
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, name: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(registrations) = listeners.get_mut(name) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            listeners.remove(name);
        }

        if removed {
            tracing::debug!(listener_id = id.get(), event = %name, "listener removed");
        }
        removed
    }

    /// Deliver an event to every listener of `name`.
    ///
    /// Returns the number of listeners invoked.
    pub fn publish(&self, name: &str, event: Arc<ChangeEvent>) -> usize {
        let snapshot: Vec<(ListenerId, Arc<ListenerFn>)> = {
            let listeners = self.listeners.read();
            match listeners.get(name) {
                Some(registrations) => registrations
                    .iter()
                    .map(|r| (r.id, Arc::clone(&r.listener)))
                    .collect(),
                None => return 0,
            }
        };

        let mut finished = Vec::new();
        for (id, listener) in &snapshot {
            if listener(&event) == ListenerControl::Remove {
                finished.push(*id);
            }
        }
        for id in finished {
            self.unsubscribe(name, id);
        }

        tracing::trace!(event = %name, listeners = snapshot.len(), "published change event");
        snapshot.len()
    }

    /// Number of listeners registered for a name.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.read().get(name).map_or(0, Vec::len)
    }

    /// Total number of listeners across all names.
    pub fn total_listeners(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    /// Event names that currently have listeners.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove every listener of a name. Returns how many were removed.
    pub fn remove_all(&self, name: &str) -> usize {
        self.listeners.write().remove(name).map_or(0, |r| r.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("event_names", &self.event_names())
            .field("total_listeners", &self.total_listeners())
            .finish()
    }
}

/// Shared event bus handle.
pub type SharedEventBus = Arc<EventBus>;
