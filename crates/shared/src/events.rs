//! Push-frame decoding.
//!
//! Frames arriving over the messaging socket are JSON objects tagged by a
//! `type` field. Three tags are recognized; everything else, including frames
//! that fail to parse at all, collapses into [`InboundEvent::Unrecognized`]
//! so a bad frame can never take down the receive loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, DeliveryState, Message, Notification};

/// A single decoded push frame. Constructed from one frame, consumed by the
/// store, never retained.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "new_message")]
    DirectMessage {
        message_id: i64,
        sender_id: i64,
        sender_name: String,
        content: String,
        #[serde(default)]
        sent_at: Option<DateTime<Utc>>,
    },
    #[serde(rename = "new_group_message")]
    GroupMessage {
        message_id: i64,
        group_id: i64,
        sender_id: i64,
        sender_name: String,
        content: String,
        #[serde(default)]
        sent_at: Option<DateTime<Utc>>,
    },
    #[serde(rename = "notification")]
    Notification {
        #[serde(default)]
        notification_id: Option<i64>,
        title: String,
        message: String,
        #[serde(default)]
        notification_type: Option<String>,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
    },
    #[serde(skip)]
    Unrecognized { raw: String },
}

impl InboundEvent {
    /// Decode one text frame. Unknown tags and malformed payloads yield
    /// `Unrecognized`; this function never fails.
    pub fn decode(frame: &str) -> InboundEvent {
        match serde_json::from_str(frame) {
            Ok(event) => event,
            Err(_) => InboundEvent::Unrecognized {
                raw: frame.to_string(),
            },
        }
    }

    /// Canonicalize a message event into `(conversation, message)`.
    /// Returns `None` for notification and unrecognized frames.
    ///
    /// Inbound messages reached this client, so they enter the store as
    /// `Delivered`. A missing timestamp falls back to the arrival time,
    /// keeping the ordering invariant intact.
    pub fn into_message(self) -> Option<(ConversationId, Message)> {
        match self {
            InboundEvent::DirectMessage {
                message_id,
                sender_id,
                sender_name,
                content,
                sent_at,
            } => {
                let conversation = ConversationId::Direct(sender_id);
                Some((
                    conversation.clone(),
                    Message {
                        id: message_id.to_string(),
                        conversation,
                        sender_id,
                        sender_name,
                        content,
                        sent_at: sent_at.unwrap_or_else(Utc::now),
                        delivery: DeliveryState::Delivered,
                    },
                ))
            }
            InboundEvent::GroupMessage {
                message_id,
                group_id,
                sender_id,
                sender_name,
                content,
                sent_at,
            } => {
                let conversation = ConversationId::Group(group_id);
                Some((
                    conversation.clone(),
                    Message {
                        id: message_id.to_string(),
                        conversation,
                        sender_id,
                        sender_name,
                        content,
                        sent_at: sent_at.unwrap_or_else(Utc::now),
                        delivery: DeliveryState::Delivered,
                    },
                ))
            }
            _ => None,
        }
    }

    /// Canonicalize a notification event. Events without a server id get a
    /// client fallback id; the store deduplicates those by content.
    pub fn into_notification(self) -> Option<Notification> {
        match self {
            InboundEvent::Notification {
                notification_id,
                title,
                message,
                notification_type,
                created_at,
            } => Some(Notification {
                id: notification_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(Notification::fallback_id),
                title,
                message,
                category: notification_type.unwrap_or_else(|| "general".to_string()),
                created_at: created_at.unwrap_or_else(Utc::now),
                is_read: false,
            }),
            _ => None,
        }
    }
}

/// Best-effort mirror of a just-sent message, pushed over the live socket so
/// other online participants see it before their next REST refresh. The REST
/// write remains the durable record; receivers dedup by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMirror {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    pub content: String,
}

impl PushMirror {
    pub fn for_conversation(conversation: &ConversationId, content: &str) -> PushMirror {
        match conversation {
            ConversationId::Direct(user_id) => PushMirror {
                receiver_id: Some(*user_id),
                group_id: None,
                content: content.to_string(),
            },
            ConversationId::Group(group_id) => PushMirror {
                receiver_id: None,
                group_id: Some(*group_id),
                content: content.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_direct_message() {
        let frame = r#"{
            "type": "new_message",
            "message_id": 17,
            "sender_id": 4,
            "sender_name": "Priya Nair",
            "content": "staff meeting moved to 3pm",
            "sent_at": "2026-03-02T10:15:00Z"
        }"#;
        let (conversation, msg) = InboundEvent::decode(frame).into_message().unwrap();
        assert_eq!(conversation, ConversationId::Direct(4));
        assert_eq!(msg.id, "17");
        assert_eq!(msg.delivery, DeliveryState::Delivered);
    }

    #[test]
    fn decodes_group_message_into_group_namespace() {
        let frame = r#"{
            "type": "new_group_message",
            "message_id": 18,
            "group_id": 4,
            "sender_id": 9,
            "sender_name": "Dev Patel",
            "content": "lab reports due Monday"
        }"#;
        let (conversation, _) = InboundEvent::decode(frame).into_message().unwrap();
        // Same numeric id as a direct peer must land in a different scope.
        assert_eq!(conversation, ConversationId::Group(4));
        assert_ne!(conversation, ConversationId::Direct(4));
    }

    #[test]
    fn notification_without_id_gets_fallback() {
        let frame = r#"{
            "type": "notification",
            "title": "Holiday",
            "message": "Campus closed tomorrow"
        }"#;
        let n = InboundEvent::decode(frame).into_notification().unwrap();
        assert!(n.has_fallback_id());
        assert!(!n.is_read);
        assert_eq!(n.category, "general");
    }

    #[test]
    fn unknown_tag_is_unrecognized() {
        let frame = r#"{"type": "presence_update", "user_id": 3}"#;
        assert!(matches!(
            InboundEvent::decode(frame),
            InboundEvent::Unrecognized { .. }
        ));
    }

    #[test]
    fn malformed_frame_is_unrecognized_not_an_error() {
        assert!(matches!(
            InboundEvent::decode("not json at all {"),
            InboundEvent::Unrecognized { .. }
        ));
    }

    #[test]
    fn missing_required_field_is_unrecognized() {
        // A new_message without its message_id is structurally unusable.
        let frame = r#"{"type": "new_message", "sender_id": 4}"#;
        assert!(matches!(
            InboundEvent::decode(frame),
            InboundEvent::Unrecognized { .. }
        ));
    }

    #[test]
    fn mirror_targets_follow_the_conversation() {
        let direct = PushMirror::for_conversation(&ConversationId::Direct(5), "hi");
        assert_eq!(direct.receiver_id, Some(5));
        assert_eq!(direct.group_id, None);

        let group = PushMirror::for_conversation(&ConversationId::Group(2), "hi");
        assert_eq!(group.receiver_id, None);
        assert_eq!(group.group_id, Some(2));
    }
}
