use crate::models::MessageView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events a client may send over its socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        receiver_id: Uuid,
        content: String,
        #[serde(default)]
        reply_to: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    EditMessage { message_id: Uuid, content: String },
    #[serde(rename_all = "camelCase")]
    DeleteMessage { message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Typing { receiver_id: Uuid },
    #[serde(rename_all = "camelCase")]
    StopTyping { receiver_id: Uuid },
    /// Exactly one of the two ids must be present.
    #[serde(rename_all = "camelCase")]
    MessageRead {
        #[serde(default)]
        message_id: Option<Uuid>,
        #[serde(default)]
        sender_id: Option<Uuid>,
    },
}

impl ClientEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::EditMessage { .. } => "edit_message",
            ClientEvent::DeleteMessage { .. } => "delete_message",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::StopTyping { .. } => "stop_typing",
            ClientEvent::MessageRead { .. } => "message_read",
        }
    }
}

/// Events pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Acknowledges a `send_message` to the transport that sent it.
    MessageSent(MessageView),
    MessageReceived(MessageView),
    MessageUpdated(MessageView),
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserTyping { user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserStoppedTyping { user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: Uuid,
        read_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    MessagesReadAll {
        message_ids: Vec<Uuid>,
        receiver_id: Uuid,
        read_at: DateTime<Utc>,
    },
    /// Sent only to the transport whose request failed.
    MessageError {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        details: Option<String>,
    },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::MessageSent(_) => "message_sent",
            ServerEvent::MessageReceived(_) => "message_received",
            ServerEvent::MessageUpdated(_) => "message_updated",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStoppedTyping { .. } => "user_stopped_typing",
            ServerEvent::MessageRead { .. } => "message_read",
            ServerEvent::MessagesReadAll { .. } => "messages_read_all",
            ServerEvent::MessageError { .. } => "message_error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
