//! Subscriber fan-out.
//!
//! Consumers subscribe to a named scope and receive the derived view for
//! that scope on every mutation, so the open chat pane, the inbox list and
//! the header badge never re-implement merge or dedup logic themselves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use classline_shared::{ChatSummary, ConversationId, Message};

use crate::ws::ConnectionStatus;

/// A named subset of store state a subscriber cares about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One conversation's ordered message sequence.
    Conversation(ConversationId),
    /// The inbox: every conversation summary.
    ConversationList,
    /// The header badge: notification unread count.
    NotificationBadge,
    /// Socket status, for the passive online/offline indicator.
    Connection,
}

/// Derived view delivered to subscribers. Always the merged result, never a
/// raw push event.
#[derive(Debug, Clone)]
pub enum ScopeView {
    Conversation(Vec<Message>),
    ConversationList(Vec<ChatSummary>),
    NotificationBadge(BadgeView),
    Connection(ConnectionStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeView {
    pub unread: u32,
}

type Callback = Arc<dyn Fn(&ScopeView) + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    subscribers: HashMap<Scope, Vec<(u64, Callback)>>,
}

/// Scope-keyed subscriber registry. Every subscriber to a scope is notified
/// on every mutation of that scope; there is no coalescing.
#[derive(Default)]
pub(crate) struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        scope: Scope,
        callback: impl Fn(&ScopeView) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.inner.lock().expect("fanout registry poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .subscribers
            .entry(scope.clone())
            .or_default()
            .push((id, Arc::new(callback)));
        Subscription {
            registry: Arc::downgrade(self),
            scope,
            id,
        }
    }

    /// Deliver a view to every subscriber of `scope`. Callbacks run on the
    /// caller's thread, outside the registry lock, so a callback may read
    /// the store again.
    pub(crate) fn notify(&self, scope: &Scope, view: &ScopeView) {
        let callbacks: Vec<Callback> = {
            let inner = self.inner.lock().expect("fanout registry poisoned");
            match inner.subscribers.get(scope) {
                Some(entries) => entries.iter().map(|(_, cb)| cb.clone()).collect(),
                None => return,
            }
        };
        for callback in callbacks {
            callback(view);
        }
    }

    fn remove(&self, scope: &Scope, id: u64) {
        let mut inner = self.inner.lock().expect("fanout registry poisoned");
        if let Some(entries) = inner.subscribers.get_mut(scope) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                inner.subscribers.remove(scope);
            }
        }
    }
}

/// Handle returned by `subscribe`. Dropping it unsubscribes.
pub struct Subscription {
    registry: Weak<Registry>,
    scope: Scope,
    id: u64,
}

impl Subscription {
    /// Explicitly unsubscribe. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.scope, self.id);
        }
    }
}
