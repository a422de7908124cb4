//! One signed-in user's messaging session.
//!
//! The session glues the three layers together: REST snapshots flow from the
//! [`MessagingApi`] into the store, the socket is owned by the connection
//! manager, and the optimistic send path coordinates all three. Identity and
//! credentials are explicit constructor arguments; nothing here reads
//! ambient state.

use std::sync::Arc;

use chrono::Utc;

use classline_shared::{
    ApiError, ConversationId, DeliveryState, Message, PushMirror,
};

use crate::api::{ApiClient, MessagingApi};
use crate::store::SyncStore;
use crate::ws::{ConnectionManager, ReconnectConfig, Transport, WsTransport};

pub struct Session {
    user_id: i64,
    display_name: String,
    store: Arc<SyncStore>,
    api: Arc<dyn MessagingApi>,
    connection: ConnectionManager,
}

impl Session {
    /// Build a session over explicit collaborators. Tests inject fakes here.
    pub fn new(
        user_id: i64,
        display_name: impl Into<String>,
        api: Arc<dyn MessagingApi>,
        store: Arc<SyncStore>,
        connection: ConnectionManager,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            store,
            api,
            connection,
        }
    }

    /// Build a production session from endpoint bases and a bearer token.
    pub fn open(
        http_base: &str,
        ws_base: &str,
        token: &str,
        user_id: i64,
        display_name: impl Into<String>,
    ) -> Self {
        let store = Arc::new(SyncStore::new());
        let api = Arc::new(ApiClient::new(http_base, token));
        let transport: Arc<dyn Transport> = Arc::new(WsTransport);
        let connection = ConnectionManager::new(
            ws_base,
            user_id,
            transport,
            store.clone(),
            ReconnectConfig::default(),
        );
        Self::new(user_id, display_name, api, store, connection)
    }

    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    // --- Socket lifecycle ---

    pub fn connect(&self) {
        self.connection.connect();
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    // --- REST refresh ---

    /// Refresh the inbox from the server.
    pub async fn refresh_chats(&self) -> Result<(), ApiError> {
        let chats = self.api.fetch_chats().await?;
        self.store.apply_chat_snapshot(chats);
        Ok(())
    }

    /// Refresh the notification list from the server.
    pub async fn refresh_notifications(&self) -> Result<(), ApiError> {
        let records = self.api.fetch_notifications(false, 50, 0).await?;
        self.store.apply_notification_snapshot(records);
        Ok(())
    }

    /// Open a conversation: load its history, focus it, and tell the server
    /// it has been read. Focusing zeroes the local unread count even if the
    /// server call fails; the next snapshot reconciles.
    pub async fn open_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<(), ApiError> {
        let records = self.api.fetch_messages(conversation).await?;
        self.store.apply_message_snapshot(conversation, records);
        self.store.set_focused(Some(conversation.clone()));
        self.api.mark_conversation_read(conversation).await
    }

    /// Leave the currently focused conversation.
    pub fn close_conversation(&self) {
        self.store.set_focused(None);
    }

    // --- Outbound send path ---

    /// Send a message: an optimistic echo appears immediately, the durable
    /// REST write runs, and on success the confirmed record replaces the
    /// echo and a best-effort mirror goes out over the socket. On failure
    /// the echo stays visible, marked `Failed`.
    pub async fn send(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<(), ApiError> {
        let temp_id = Message::pending_id();
        self.store.send_local_echo(Message {
            id: temp_id.clone(),
            conversation: conversation.clone(),
            sender_id: self.user_id,
            sender_name: self.display_name.clone(),
            content: content.to_string(),
            sent_at: Utc::now(),
            delivery: DeliveryState::Sending,
        });

        match self.api.send_message(conversation, content).await {
            Ok(record) => {
                let mut confirmed = record.into_message(conversation.clone());
                confirmed.delivery = DeliveryState::Sent;
                self.store.confirm_local_echo(&temp_id, confirmed);
                self.mirror(conversation, content);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%conversation, error = %e, "durable send failed");
                self.store.fail_local_echo(conversation, &temp_id);
                Err(e)
            }
        }
    }

    /// Mirror a confirmed send over the live socket so online peers see it
    /// without waiting for their next refresh. Dropped when disconnected;
    /// the REST write already holds the durable record.
    fn mirror(&self, conversation: &ConversationId, content: &str) {
        let mirror = PushMirror::for_conversation(conversation, content);
        match serde_json::to_string(&mirror) {
            Ok(frame) => {
                self.connection.push(frame);
            }
            Err(e) => tracing::warn!(error = %e, "push mirror serialization failed"),
        }
    }

    // --- Notifications ---

    /// Mark one notification read, locally first, then on the server when it
    /// carries a server id. Fallback-id entries have no server row yet.
    pub async fn read_notification(&self, id: &str) -> Result<(), ApiError> {
        self.store.mark_notification_read(id);
        match id.parse::<i64>() {
            Ok(server_id) => self.api.mark_notification_read(server_id).await,
            Err(_) => Ok(()),
        }
    }

    /// Mark every notification read.
    pub async fn read_all_notifications(&self) -> Result<(), ApiError> {
        for n in self.store.notifications() {
            self.store.mark_notification_read(&n.id);
        }
        self.api.mark_all_notifications_read().await
    }
}
