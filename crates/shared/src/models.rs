//! Shared data models for the classline messaging and notification layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Conversations ---

/// Identifies a conversation. Direct conversations are keyed by the peer's
/// user id, group conversations by the group id; the two namespaces never
/// collide because the variant is part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationId {
    Direct(i64),
    Group(i64),
}

impl ConversationId {
    pub fn is_group(&self) -> bool {
        matches!(self, ConversationId::Group(_))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationId::Direct(id) => write!(f, "direct:{}", id),
            ConversationId::Group(id) => write!(f, "group:{}", id),
        }
    }
}

// --- Messages ---

/// Delivery progress of a single message, from the sender's point of view.
///
/// `Sending` and `Failed` only ever apply to locally-originated messages;
/// a failed send stays visible with this marker until the user retries or
/// discards it, it never silently disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Canonical chat message as held by the reconciliation store.
///
/// `id` is the server-assigned id rendered as a string, or a temporary
/// `pending-<uuid>` id for an optimistic record that has not been confirmed
/// yet. The temporary id is replaced, never duplicated, once the durable
/// write returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation: ConversationId,
    pub sender_id: i64,
    pub sender_name: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub delivery: DeliveryState,
}

impl Message {
    /// Generate a temporary id for an optimistic local echo.
    pub fn pending_id() -> String {
        format!("pending-{}", uuid::Uuid::new_v4())
    }

    pub fn is_pending(&self) -> bool {
        self.id.starts_with("pending-")
    }
}

// --- Notifications ---

/// A user-facing notification.
///
/// `id` is the server id rendered as a string. Push frames occasionally
/// arrive without a server id; those get a `local-<uuid>` fallback id, which
/// the store treats specially when deduplicating (see the client store).
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Notification {
    /// Generate a fallback id for a push notification that carried none.
    pub fn fallback_id() -> String {
        format!("local-{}", uuid::Uuid::new_v4())
    }

    /// Whether this notification carries a client-generated fallback id.
    pub fn has_fallback_id(&self) -> bool {
        self.id.starts_with("local-")
    }
}

// --- Conversation summaries (inbox rows) ---

/// One row of the conversation list: enough to render the inbox without
/// loading the full message history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSummary {
    pub id: ConversationId,
    pub is_group: bool,
    /// Display label: the peer's name for direct chats, the group name for
    /// group chats. May be absent for conversations first seen via push.
    pub title: Option<String>,
    pub participant_ids: Vec<i64>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

// --- REST DTOs ---
//
// Wire shapes of the messaging/notification endpoints. Field names match the
// backend's JSON as-is, so no rename attributes are needed.

/// A message as returned by the REST endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub receiver_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Convert a REST record into the canonical form for a conversation.
    ///
    /// Read state maps onto the sender-side delivery ladder: a record the
    /// recipient has read is `Read`, anything else that made it to the
    /// server is `Delivered`.
    pub fn into_message(self, conversation: ConversationId) -> Message {
        Message {
            id: self.id.to_string(),
            conversation,
            sender_id: self.sender_id,
            sender_name: self.sender_name.unwrap_or_default(),
            content: self.content,
            sent_at: self.sent_at,
            delivery: if self.is_read {
                DeliveryState::Read
            } else {
                DeliveryState::Delivered
            },
        }
    }
}

/// Request body for the direct-message endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendDirectMessageRequest {
    pub receiver_id: i64,
    pub content: String,
}

/// Request body for the group-message endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendGroupMessageRequest {
    pub content: String,
}

/// One direct conversation as returned by `/messaging/messages/conversations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub last_message: LastMessageRecord,
    pub unread_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessageRecord {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_from_me: bool,
}

impl ConversationRecord {
    pub fn into_summary(self) -> ChatSummary {
        ChatSummary {
            id: ConversationId::Direct(self.user_id),
            is_group: false,
            title: Some(self.full_name.unwrap_or(self.username)),
            participant_ids: vec![self.user_id],
            last_message: self.last_message.content,
            last_message_at: self.last_message.sent_at,
            unread_count: self.unread_count,
        }
    }
}

/// One chat group as returned by `/messaging/groups/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<i64>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

impl GroupRecord {
    pub fn into_summary(self) -> ChatSummary {
        ChatSummary {
            id: ConversationId::Group(self.id),
            is_group: true,
            title: Some(self.name),
            participant_ids: self.member_ids,
            last_message: self.last_message,
            last_message_at: self.last_message_at,
            unread_count: self.unread_count,
        }
    }
}

/// A notification as returned by `/notifications/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn into_notification(self) -> Notification {
        Notification {
            id: self.id.to_string(),
            title: self.title,
            message: self.message,
            category: self.notification_type,
            created_at: self.created_at,
            is_read: self.is_read,
        }
    }
}

/// Response of `/notifications/unread-count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_namespaces_are_disjoint() {
        assert_ne!(ConversationId::Direct(7), ConversationId::Group(7));
        assert_eq!(ConversationId::Direct(7).to_string(), "direct:7");
        assert_eq!(ConversationId::Group(7).to_string(), "group:7");
    }

    #[test]
    fn message_record_maps_read_state() {
        let record = MessageRecord {
            id: 42,
            sender_id: 3,
            sender_name: Some("Amira Khan".into()),
            receiver_id: Some(9),
            group_id: None,
            content: "exam schedule is up".into(),
            is_read: true,
            sent_at: Utc::now(),
        };
        let msg = record.into_message(ConversationId::Direct(3));
        assert_eq!(msg.id, "42");
        assert_eq!(msg.delivery, DeliveryState::Read);
        assert!(!msg.is_pending());
    }

    #[test]
    fn fallback_ids_are_recognizable() {
        let n = Notification {
            id: Notification::fallback_id(),
            title: "Fee reminder".into(),
            message: "Term fees due Friday".into(),
            category: "fees".into(),
            created_at: Utc::now(),
            is_read: false,
        };
        assert!(n.has_fallback_id());
    }
}
