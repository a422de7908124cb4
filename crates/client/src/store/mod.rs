//! The reconciliation store: single source of truth for chat and
//! notification state.
//!
//! Snapshots fetched over REST and events pushed over the socket both land
//! here and are merged into canonical, deduplicated, ordered collections.
//! Consumers subscribe to a [`Scope`] and receive derived views; no UI
//! component holds an authoritative copy or re-derives merge logic.
//!
//! Every entry point takes the store lock for its whole critical section,
//! so no two mutations ever interleave mid-merge.

mod conversations;
mod fanout;
mod notifications;

pub use fanout::{BadgeView, Scope, ScopeView, Subscription};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use classline_shared::{
    ChatSummary, ConversationId, InboundEvent, Message, MessageRecord, Notification,
    NotificationRecord,
};

use crate::ws::ConnectionStatus;
use conversations::{ConfirmOutcome, ConversationMessages};
use fanout::Registry;
use notifications::NotificationList;

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, ConversationMessages>,
    chats: Vec<ChatSummary>,
    notifications: NotificationList,
    focused: Option<ConversationId>,
    connection: ConnectionStatus,
}

/// The store itself. Cheap to share; the connection manager, the session and
/// any number of views hold the same `Arc<SyncStore>`.
pub struct SyncStore {
    inner: Mutex<Inner>,
    registry: Arc<Registry>,
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            registry: Arc::new(Registry::default()),
        }
    }

    // --- Subscription ---

    /// Subscribe to a scope. The callback runs synchronously on every
    /// mutation of that scope, with the freshly derived view.
    pub fn subscribe(
        &self,
        scope: Scope,
        callback: impl Fn(&ScopeView) + Send + Sync + 'static,
    ) -> Subscription {
        self.registry.subscribe(scope, callback)
    }

    // --- Push events ---

    /// Apply one decoded push event. Duplicates and unusable events are
    /// dropped and logged; this never fails.
    pub fn apply_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Unrecognized { raw } => {
                tracing::warn!(frame = %raw, "dropping unrecognized push frame");
            }
            event @ InboundEvent::Notification { .. } => {
                if let Some(notification) = event.into_notification() {
                    self.insert_notification(notification);
                }
            }
            event => {
                if let Some((conversation, msg)) = event.into_message() {
                    self.insert_inbound_message(conversation, msg);
                }
            }
        }
    }

    fn insert_inbound_message(&self, conversation: ConversationId, msg: Message) {
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            let added = inner
                .conversations
                .entry(conversation.clone())
                .or_default()
                .add(msg.clone());
            if !added {
                tracing::debug!(id = %msg.id, %conversation, "duplicate message event ignored");
                return;
            }
            let focused = inner.focused.as_ref() == Some(&conversation);
            touch_summary(&mut inner.chats, &conversation, &msg, !focused);
            push_conversation_views(&inner, &conversation, &mut views);
        }
        self.dispatch(views);
    }

    fn insert_notification(&self, notification: Notification) {
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            if !inner.notifications.insert_event(notification) {
                return;
            }
            views.push(badge_view(&inner));
        }
        self.dispatch(views);
    }

    // --- REST snapshots ---

    /// Replace a conversation's history with the authoritative server list.
    /// Locally-pending sends survive the replacement.
    pub fn apply_message_snapshot(
        &self,
        conversation: &ConversationId,
        records: Vec<MessageRecord>,
    ) {
        let history: Vec<Message> = records
            .into_iter()
            .map(|r| r.into_message(conversation.clone()))
            .collect();
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            inner
                .conversations
                .entry(conversation.clone())
                .or_default()
                .set_history(history);
            push_conversation_views(&inner, conversation, &mut views);
        }
        self.dispatch(views);
    }

    /// Replace the inbox with the server's conversation list.
    pub fn apply_chat_snapshot(&self, chats: Vec<ChatSummary>) {
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            inner.chats = chats;
            views.push(list_view(&inner));
        }
        self.dispatch(views);
    }

    /// Replace the notification list with the server's. Push-only fallback
    /// entries the server has not caught up with are kept.
    pub fn apply_notification_snapshot(&self, records: Vec<NotificationRecord>) {
        let history: Vec<Notification> = records
            .into_iter()
            .map(|r| r.into_notification())
            .collect();
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            inner.notifications.set_history(history);
            views.push(badge_view(&inner));
        }
        self.dispatch(views);
    }

    // --- Optimistic send path ---

    /// Display an optimistic record immediately, before the durable write
    /// resolves.
    pub fn send_local_echo(&self, msg: Message) {
        let conversation = msg.conversation.clone();
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            inner
                .conversations
                .entry(conversation.clone())
                .or_default()
                .add(msg.clone());
            touch_summary(&mut inner.chats, &conversation, &msg, false);
            push_conversation_views(&inner, &conversation, &mut views);
        }
        self.dispatch(views);
    }

    /// Reconcile a confirmed durable write against its optimistic record.
    /// Safe to call after the conversation is gone; that case is a logged
    /// no-op.
    pub fn confirm_local_echo(&self, temp_id: &str, confirmed: Message) {
        let conversation = confirmed.conversation.clone();
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            let Some(convo) = inner.conversations.get_mut(&conversation) else {
                tracing::debug!(%conversation, temp_id, "send confirmed for a torn-down conversation");
                return;
            };
            match convo.confirm(temp_id, confirmed.clone()) {
                ConfirmOutcome::Missing => {
                    tracing::debug!(temp_id, "optimistic record already gone, nothing to confirm");
                    return;
                }
                ConfirmOutcome::Replaced | ConfirmOutcome::Collapsed => {
                    touch_summary(&mut inner.chats, &conversation, &confirmed, false);
                    push_conversation_views(&inner, &conversation, &mut views);
                }
            }
        }
        self.dispatch(views);
    }

    /// Mark an optimistic record as failed; it stays visible.
    pub fn fail_local_echo(&self, conversation: &ConversationId, temp_id: &str) {
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            let failed = inner
                .conversations
                .get_mut(conversation)
                .map(|c| c.fail(temp_id))
                .unwrap_or(false);
            if !failed {
                tracing::debug!(%conversation, temp_id, "send failed for a torn-down conversation");
                return;
            }
            push_conversation_views(&inner, conversation, &mut views);
        }
        self.dispatch(views);
    }

    // --- Read state and focus ---

    /// Focus a conversation. The focused conversation is marked read and
    /// its unread counter drops to exactly zero; subsequent inbound events
    /// for it no longer count as unread.
    pub fn set_focused(&self, conversation: Option<ConversationId>) {
        {
            let mut inner = self.lock();
            inner.focused = conversation.clone();
        }
        if let Some(conversation) = conversation {
            self.mark_conversation_read(&conversation);
        }
    }

    /// Flip a conversation's settled messages to read and zero its unread
    /// counter.
    pub fn mark_conversation_read(&self, conversation: &ConversationId) {
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            if let Some(convo) = inner.conversations.get_mut(conversation) {
                convo.mark_read();
            }
            if let Some(summary) = inner.chats.iter_mut().find(|c| &c.id == conversation) {
                summary.unread_count = 0;
            }
            push_conversation_views(&inner, conversation, &mut views);
        }
        self.dispatch(views);
    }

    pub fn mark_notification_read(&self, id: &str) {
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            if !inner.notifications.mark_read(id) {
                return;
            }
            views.push(badge_view(&inner));
        }
        self.dispatch(views);
    }

    /// Explicit reversal of a read notification. Distinct, intentional
    /// operation; nothing in the real-time layer calls this automatically.
    pub fn mark_notification_unread(&self, id: &str) {
        let mut views = Vec::new();
        {
            let mut inner = self.lock();
            if !inner.notifications.mark_unread(id) {
                return;
            }
            views.push(badge_view(&inner));
        }
        self.dispatch(views);
    }

    // --- Connection status ---

    pub fn set_connection_status(&self, status: ConnectionStatus) {
        {
            let mut inner = self.lock();
            if inner.connection == status {
                return;
            }
            inner.connection = status;
        }
        self.registry
            .notify(&Scope::Connection, &ScopeView::Connection(status));
    }

    // --- Read-only access ---

    pub fn conversation_messages(&self, conversation: &ConversationId) -> Vec<Message> {
        self.lock()
            .conversations
            .get(conversation)
            .map(|c| c.messages().to_vec())
            .unwrap_or_default()
    }

    /// Inbox rows, most recent activity first.
    pub fn chats(&self) -> Vec<ChatSummary> {
        sorted_chats(&self.lock().chats)
    }

    /// Notifications, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.items().to_vec()
    }

    pub fn unread_notifications(&self) -> u32 {
        self.lock().notifications.unread()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.lock().connection
    }

    pub fn focused(&self) -> Option<ConversationId> {
        self.lock().focused.clone()
    }

    // --- Internals ---

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("sync store poisoned")
    }

    fn dispatch(&self, views: Vec<(Scope, ScopeView)>) {
        for (scope, view) in views {
            self.registry.notify(&scope, &view);
        }
    }
}

fn push_conversation_views(
    inner: &Inner,
    conversation: &ConversationId,
    views: &mut Vec<(Scope, ScopeView)>,
) {
    let messages = inner
        .conversations
        .get(conversation)
        .map(|c| c.messages().to_vec())
        .unwrap_or_default();
    views.push((
        Scope::Conversation(conversation.clone()),
        ScopeView::Conversation(messages),
    ));
    views.push(list_view(inner));
}

fn list_view(inner: &Inner) -> (Scope, ScopeView) {
    (
        Scope::ConversationList,
        ScopeView::ConversationList(sorted_chats(&inner.chats)),
    )
}

fn badge_view(inner: &Inner) -> (Scope, ScopeView) {
    (
        Scope::NotificationBadge,
        ScopeView::NotificationBadge(BadgeView {
            unread: inner.notifications.unread(),
        }),
    )
}

fn sorted_chats(chats: &[ChatSummary]) -> Vec<ChatSummary> {
    let mut sorted = chats.to_vec();
    sorted.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    sorted
}

/// Update or create the inbox row for a conversation after a new message.
fn touch_summary(
    chats: &mut Vec<ChatSummary>,
    conversation: &ConversationId,
    msg: &Message,
    count_unread: bool,
) {
    if let Some(summary) = chats.iter_mut().find(|c| &c.id == conversation) {
        summary.last_message = Some(msg.content.clone());
        summary.last_message_at = Some(msg.sent_at);
        if count_unread {
            summary.unread_count += 1;
        }
        return;
    }
    chats.push(ChatSummary {
        id: conversation.clone(),
        is_group: conversation.is_group(),
        title: if conversation.is_group() {
            None
        } else {
            Some(msg.sender_name.clone())
        },
        participant_ids: vec![msg.sender_id],
        last_message: Some(msg.content.clone()),
        last_message_at: Some(msg.sent_at),
        unread_count: if count_unread { 1 } else { 0 },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use classline_shared::DeliveryState;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn direct_event(message_id: i64, sender_id: i64) -> InboundEvent {
        InboundEvent::decode(&format!(
            r#"{{"type":"new_message","message_id":{message_id},"sender_id":{sender_id},
                "sender_name":"Sana Iqbal","content":"hello","sent_at":"2026-03-02T10:00:00Z"}}"#
        ))
    }

    fn group_event(message_id: i64, group_id: i64) -> InboundEvent {
        InboundEvent::decode(&format!(
            r#"{{"type":"new_group_message","message_id":{message_id},"group_id":{group_id},
                "sender_id":8,"sender_name":"Sana Iqbal","content":"hello group",
                "sent_at":"2026-03-02T10:00:00Z"}}"#
        ))
    }

    fn chat(store: &SyncStore, conversation: &ConversationId) -> ChatSummary {
        store
            .chats()
            .into_iter()
            .find(|c| &c.id == conversation)
            .expect("summary exists")
    }

    #[test]
    fn duplicate_event_never_changes_visible_count() {
        let store = SyncStore::new();
        store.apply_event(direct_event(1, 5));
        store.apply_event(direct_event(1, 5));

        let convo = ConversationId::Direct(5);
        assert_eq!(store.conversation_messages(&convo).len(), 1);
        assert_eq!(chat(&store, &convo).unread_count, 1);
    }

    #[test]
    fn unread_counts_distinct_ids_for_unfocused_conversations() {
        let store = SyncStore::new();
        store.apply_event(direct_event(1, 5));
        store.apply_event(direct_event(2, 5));
        store.apply_event(direct_event(2, 5)); // duplicate
        store.apply_event(group_event(3, 9));

        assert_eq!(chat(&store, &ConversationId::Direct(5)).unread_count, 2);
        assert_eq!(chat(&store, &ConversationId::Group(9)).unread_count, 1);
    }

    #[test]
    fn focusing_resets_unread_to_zero_and_keeps_it_there() {
        let store = SyncStore::new();
        let convo = ConversationId::Direct(5);
        store.apply_event(direct_event(1, 5));
        store.apply_event(direct_event(2, 5));
        assert_eq!(chat(&store, &convo).unread_count, 2);

        store.set_focused(Some(convo.clone()));
        assert_eq!(chat(&store, &convo).unread_count, 0);

        // Events for the focused conversation do not count as unread.
        store.apply_event(direct_event(3, 5));
        assert_eq!(chat(&store, &convo).unread_count, 0);

        // Unfocusing restores normal accounting.
        store.set_focused(None);
        store.apply_event(direct_event(4, 5));
        assert_eq!(chat(&store, &convo).unread_count, 1);
    }

    #[test]
    fn snapshot_preserves_pending_send() {
        let store = SyncStore::new();
        let convo = ConversationId::Direct(5);
        let temp_id = Message::pending_id();
        store.send_local_echo(Message {
            id: temp_id.clone(),
            conversation: convo.clone(),
            sender_id: 1,
            sender_name: "Me".into(),
            content: "optimistic".into(),
            sent_at: Utc::now(),
            delivery: DeliveryState::Sending,
        });

        store.apply_message_snapshot(
            &convo,
            vec![MessageRecord {
                id: 10,
                sender_id: 5,
                sender_name: Some("Sana Iqbal".into()),
                receiver_id: Some(1),
                group_id: None,
                content: "from history".into(),
                is_read: false,
                sent_at: Utc::now() - chrono::Duration::minutes(5),
            }],
        );

        let messages = store.conversation_messages(&convo);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.id == temp_id));
    }

    #[test]
    fn confirm_after_teardown_is_a_noop() {
        let store = SyncStore::new();
        let confirmed = Message {
            id: "42".into(),
            conversation: ConversationId::Direct(5),
            sender_id: 1,
            sender_name: "Me".into(),
            content: "late".into(),
            sent_at: Utc::now(),
            delivery: DeliveryState::Sent,
        };
        // No conversation state exists at all; must not panic or insert.
        store.confirm_local_echo("pending-gone", confirmed);
        assert!(store
            .conversation_messages(&ConversationId::Direct(5))
            .is_empty());
    }

    #[test]
    fn subscribers_receive_derived_views_not_raw_events() {
        let store = SyncStore::new();
        let convo = ConversationId::Direct(5);
        let deliveries = Arc::new(AtomicU32::new(0));

        let d = deliveries.clone();
        let _sub = store.subscribe(Scope::Conversation(convo.clone()), move |view| {
            if let ScopeView::Conversation(messages) = view {
                assert!(!messages.is_empty());
                d.fetch_add(1, Ordering::SeqCst);
            }
        });

        store.apply_event(direct_event(1, 5));
        store.apply_event(direct_event(1, 5)); // duplicate: no mutation, no delivery
        store.apply_event(direct_event(2, 5));
        assert_eq!(deliveries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn badge_subscribers_track_notification_unread_count() {
        let store = SyncStore::new();
        let last = Arc::new(AtomicU32::new(u32::MAX));

        let l = last.clone();
        let _sub = store.subscribe(Scope::NotificationBadge, move |view| {
            if let ScopeView::NotificationBadge(badge) = view {
                l.store(badge.unread, Ordering::SeqCst);
            }
        });

        store.apply_notification_snapshot(vec![
            NotificationRecord {
                id: 1,
                title: "one".into(),
                message: "m".into(),
                notification_type: "academic".into(),
                is_read: false,
                created_at: Utc::now(),
            },
            NotificationRecord {
                id: 2,
                title: "two".into(),
                message: "m".into(),
                notification_type: "academic".into(),
                is_read: false,
                created_at: Utc::now(),
            },
        ]);
        assert_eq!(last.load(Ordering::SeqCst), 2);

        store.mark_notification_read("2");
        assert_eq!(last.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_scope_sees_status_transitions() {
        let store = SyncStore::new();
        let transitions = Arc::new(AtomicU32::new(0));

        let t = transitions.clone();
        let _sub = store.subscribe(Scope::Connection, move |view| {
            if let ScopeView::Connection(_) = view {
                t.fetch_add(1, Ordering::SeqCst);
            }
        });

        store.set_connection_status(ConnectionStatus::Connecting);
        store.set_connection_status(ConnectionStatus::Connected);
        store.set_connection_status(ConnectionStatus::Connected); // unchanged: no delivery
        store.set_connection_status(ConnectionStatus::Disconnected);
        assert_eq!(transitions.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn inbox_orders_by_most_recent_activity() {
        let store = SyncStore::new();
        store.apply_event(InboundEvent::decode(
            r#"{"type":"new_message","message_id":1,"sender_id":5,"sender_name":"A",
                "content":"old","sent_at":"2026-03-01T10:00:00Z"}"#,
        ));
        store.apply_event(InboundEvent::decode(
            r#"{"type":"new_message","message_id":2,"sender_id":6,"sender_name":"B",
                "content":"new","sent_at":"2026-03-02T10:00:00Z"}"#,
        ));
        let chats = store.chats();
        assert_eq!(chats[0].id, ConversationId::Direct(6));
        assert_eq!(chats[1].id, ConversationId::Direct(5));
    }
}
