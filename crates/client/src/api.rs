//! HTTP client for the messaging and notification endpoints.
//!
//! The session consumes the [`MessagingApi`] trait, not the concrete
//! client, so tests can inject a fake and the credentials always arrive as
//! explicit parameters rather than ambient state.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use classline_shared::{
    ApiError, ChatSummary, ConversationId, ConversationRecord, GroupRecord, MessageRecord,
    NotificationRecord, SendDirectMessageRequest, SendGroupMessageRequest, UnreadCountResponse,
};

/// The REST operations the real-time layer consumes. The backend itself is
/// an external collaborator; this is its boundary.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// All conversations (direct and group) for the inbox.
    async fn fetch_chats(&self) -> Result<Vec<ChatSummary>, ApiError>;

    /// Full message history of one conversation.
    async fn fetch_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<MessageRecord>, ApiError>;

    /// The durable write. Returns the canonical record with the
    /// server-assigned id.
    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<MessageRecord, ApiError>;

    async fn mark_conversation_read(&self, conversation: &ConversationId)
        -> Result<(), ApiError>;

    async fn fetch_notifications(
        &self,
        unread_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NotificationRecord>, ApiError>;

    async fn fetch_unread_count(&self) -> Result<u32, ApiError>;

    async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError>;

    async fn mark_all_notifications_read(&self) -> Result<(), ApiError>;
}

/// reqwest-backed client carrying the base url and bearer token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::read_json(resp).await
    }

    async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::read_json(resp).await
    }

    async fn put_empty(&self, path: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn read_json<TRes: DeserializeOwned>(resp: reqwest::Response) -> Result<TRes, ApiError> {
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MessagingApi for ApiClient {
    async fn fetch_chats(&self) -> Result<Vec<ChatSummary>, ApiError> {
        let direct: Vec<ConversationRecord> =
            self.get_json("/messaging/messages/conversations").await?;
        let groups: Vec<GroupRecord> = self.get_json("/messaging/groups/").await?;
        let mut chats: Vec<ChatSummary> = direct
            .into_iter()
            .map(ConversationRecord::into_summary)
            .chain(groups.into_iter().map(GroupRecord::into_summary))
            .collect();
        chats.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(chats)
    }

    async fn fetch_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        let path = match conversation {
            ConversationId::Direct(user_id) => format!("/messaging/messages/{user_id}"),
            ConversationId::Group(group_id) => format!("/messaging/groups/{group_id}/messages"),
        };
        self.get_json(&path).await
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<MessageRecord, ApiError> {
        match conversation {
            ConversationId::Direct(user_id) => {
                let body = SendDirectMessageRequest {
                    receiver_id: *user_id,
                    content: content.to_string(),
                };
                self.post_json("/messaging/messages/", &body).await
            }
            ConversationId::Group(group_id) => {
                let body = SendGroupMessageRequest {
                    content: content.to_string(),
                };
                self.post_json(&format!("/messaging/groups/{group_id}/messages"), &body)
                    .await
            }
        }
    }

    async fn mark_conversation_read(
        &self,
        conversation: &ConversationId,
    ) -> Result<(), ApiError> {
        let path = match conversation {
            ConversationId::Direct(user_id) => format!("/messaging/messages/{user_id}/read"),
            ConversationId::Group(group_id) => format!("/messaging/groups/{group_id}/read"),
        };
        self.put_empty(&path).await
    }

    async fn fetch_notifications(
        &self,
        unread_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NotificationRecord>, ApiError> {
        self.get_json(&format!(
            "/notifications/?unread_only={unread_only}&limit={limit}&offset={offset}"
        ))
        .await
    }

    async fn fetch_unread_count(&self) -> Result<u32, ApiError> {
        let resp: UnreadCountResponse = self.get_json("/notifications/unread-count").await?;
        Ok(resp.unread_count)
    }

    async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError> {
        self.put_empty(&format!("/notifications/{id}/read")).await
    }

    async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        self.put_empty("/notifications/mark-all-read").await
    }
}
