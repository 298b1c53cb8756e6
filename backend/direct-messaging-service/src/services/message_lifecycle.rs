//! Create, edit, soft-delete and read-receipt transitions for direct messages.
//!
//! Every transition is authorized against the stored row, applied with a
//! conditional write while holding the message's lock, and only then fanned
//! out. Fan-out is best-effort: offline parties catch up from storage.

use crate::error::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::models::{summarize, timestamp_now, ConversationSummary, Message, MessageView};
use crate::store::{MessageStore, ReadMark, UserDirectory};
use crate::websocket::message_types::ServerEvent;
use crate::websocket::{ConnectionRegistry, TransportId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_THREAD_LIMIT: usize = 50;
pub const MAX_THREAD_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTarget {
    Message(Uuid),
    /// Every unread message from this sender to the reader.
    AllFrom(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Single {
        message_id: Uuid,
        read_at: DateTime<Utc>,
        /// False when the message had already been read; nothing was sent.
        newly_read: bool,
    },
    Batch {
        message_ids: Vec<Uuid>,
        read_at: DateTime<Utc>,
    },
}

pub struct MessageLifecycleManager {
    store: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    registry: ConnectionRegistry,
    locks: KeyedLocks<Uuid>,
    max_content_len: usize,
}

impl MessageLifecycleManager {
    pub fn new(
        store: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        registry: ConnectionRegistry,
        max_content_len: usize,
    ) -> Self {
        Self {
            store,
            users,
            registry,
            locks: KeyedLocks::new(),
            max_content_len,
        }
    }

    fn validate_content<'a>(&self, content: &'a str) -> AppResult<&'a str> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("content must not be empty".into()));
        }
        if trimmed.chars().count() > self.max_content_len {
            return Err(AppError::Validation(format!(
                "content exceeds {} characters",
                self.max_content_len
            )));
        }
        Ok(trimmed)
    }

    fn fan_out(&self, event: &ServerEvent, targets: &[(Uuid, Option<TransportId>)]) {
        let delivered: usize = targets
            .iter()
            .map(|(user_id, except)| self.registry.send_to_user(*user_id, event, *except))
            .sum();
        debug!(event = event.event_type(), delivered, "fan-out complete");
    }

    /// Persists a new message from `sender_id` to `receiver_id`.
    ///
    /// `origin` is the sender's transport that asked, if any. The receiver's
    /// transports and the sender's other transports see `message_received`.
    pub async fn create(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        reply_to: Option<Uuid>,
        origin: Option<TransportId>,
    ) -> AppResult<Message> {
        let content = self.validate_content(content)?;
        if sender_id == receiver_id {
            return Err(AppError::Validation("cannot message yourself".into()));
        }
        if !self.users.exists(receiver_id).await? {
            return Err(AppError::Validation("unknown receiver".into()));
        }
        if let Some(parent_id) = reply_to {
            let parent = self.store.get(parent_id).await?;
            let same_conversation = parent
                .map(|p| p.counterpart_of(sender_id) == Some(receiver_id))
                .unwrap_or(false);
            if !same_conversation {
                return Err(AppError::Validation(
                    "reply target is not in this conversation".into(),
                ));
            }
        }

        let message = Message::new(
            sender_id,
            receiver_id,
            content.to_string(),
            reply_to,
            timestamp_now(),
        );
        self.store.insert(&message).await?;
        info!(message_id = %message.id, %sender_id, %receiver_id, "message created");

        self.fan_out(
            &ServerEvent::MessageReceived(message.view()),
            &[(receiver_id, None), (sender_id, origin)],
        );
        Ok(message)
    }

    /// Sender-only. Deleted messages cannot be edited.
    pub async fn edit(&self, message_id: Uuid, editor_id: Uuid, content: &str) -> AppResult<Message> {
        let _guard = self.locks.lock(message_id).await;

        let current = self.store.get(message_id).await?.ok_or(AppError::NotFound)?;
        if current.sender_id != editor_id {
            return Err(AppError::Forbidden);
        }
        if current.is_deleted() {
            return Err(AppError::StaleState("message was deleted".into()));
        }
        let content = self.validate_content(content)?;

        let updated = self
            .store
            .update_content(message_id, content, timestamp_now())
            .await?
            .ok_or_else(|| AppError::StaleState("message was deleted".into()))?;
        info!(%message_id, "message edited");

        self.fan_out(
            &ServerEvent::MessageUpdated(updated.view()),
            &[(updated.receiver_id, None), (updated.sender_id, None)],
        );
        Ok(updated)
    }

    /// Sender-only soft delete. The row stays; its content is withheld from views.
    pub async fn soft_delete(&self, message_id: Uuid, requester_id: Uuid) -> AppResult<Message> {
        let _guard = self.locks.lock(message_id).await;

        let current = self.store.get(message_id).await?.ok_or(AppError::NotFound)?;
        if current.sender_id != requester_id {
            return Err(AppError::Forbidden);
        }
        if current.is_deleted() {
            return Err(AppError::StaleState("message already deleted".into()));
        }

        let deleted = self
            .store
            .soft_delete(message_id, timestamp_now())
            .await?
            .ok_or_else(|| AppError::StaleState("message already deleted".into()))?;
        info!(%message_id, "message deleted");

        self.fan_out(
            &ServerEvent::MessageDeleted { message_id },
            &[(deleted.receiver_id, None), (deleted.sender_id, None)],
        );
        Ok(deleted)
    }

    /// Receiver-only. `read_at` is set once; repeating the call reports the
    /// original timestamp and notifies nobody.
    pub async fn mark_read(&self, target: ReadTarget, reader_id: Uuid) -> AppResult<ReadOutcome> {
        match target {
            ReadTarget::Message(message_id) => self.mark_one_read(message_id, reader_id).await,
            ReadTarget::AllFrom(sender_id) => self.mark_all_read(sender_id, reader_id).await,
        }
    }

    async fn mark_one_read(&self, message_id: Uuid, reader_id: Uuid) -> AppResult<ReadOutcome> {
        let _guard = self.locks.lock(message_id).await;

        let current = self.store.get(message_id).await?.ok_or(AppError::NotFound)?;
        if current.receiver_id != reader_id {
            return Err(AppError::Forbidden);
        }
        if let Some(read_at) = current.read_at {
            return Ok(ReadOutcome::Single {
                message_id,
                read_at,
                newly_read: false,
            });
        }

        let now = timestamp_now();
        let ReadMark {
            message: stored,
            newly_read,
        } = self
            .store
            .mark_read(message_id, now)
            .await?
            .ok_or(AppError::NotFound)?;
        let read_at = stored.read_at.unwrap_or(now);

        if newly_read {
            self.fan_out(
                &ServerEvent::MessageRead {
                    message_id,
                    read_at,
                },
                &[(stored.sender_id, None)],
            );
        }
        Ok(ReadOutcome::Single {
            message_id,
            read_at,
            newly_read,
        })
    }

    async fn mark_all_read(&self, sender_id: Uuid, reader_id: Uuid) -> AppResult<ReadOutcome> {
        if sender_id == reader_id {
            return Err(AppError::Validation("cannot mark your own messages read".into()));
        }

        let read_at = timestamp_now();
        let message_ids = self.store.mark_all_read(sender_id, reader_id, read_at).await?;

        if !message_ids.is_empty() {
            info!(%sender_id, %reader_id, count = message_ids.len(), "conversation marked read");
            self.fan_out(
                &ServerEvent::MessagesReadAll {
                    message_ids: message_ids.clone(),
                    receiver_id: reader_id,
                    read_at,
                },
                &[(sender_id, None)],
            );
        }
        Ok(ReadOutcome::Batch {
            message_ids,
            read_at,
        })
    }

    /// Raises `from`'s typing indicator towards `to` and tells `to`'s transports.
    pub fn set_typing(&self, from: Uuid, to: Uuid, transport_id: TransportId) -> AppResult<()> {
        if from == to {
            return Err(AppError::Validation("cannot type to yourself".into()));
        }
        if self.registry.set_typing(from, to, transport_id) {
            self.fan_out(&ServerEvent::UserTyping { user_id: from }, &[(to, None)]);
        }
        Ok(())
    }

    pub fn clear_typing(&self, from: Uuid, to: Uuid) {
        if self.registry.clear_typing(from, to) {
            self.fan_out(&ServerEvent::UserStoppedTyping { user_id: from }, &[(to, None)]);
        }
    }

    pub async fn summaries(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let messages = self.store.messages_involving(user_id).await?;
        Ok(summarize(user_id, messages))
    }

    /// Latest messages between `user_id` and `counterpart_id`, oldest first.
    pub async fn thread(
        &self,
        user_id: Uuid,
        counterpart_id: Uuid,
        limit: Option<usize>,
    ) -> AppResult<Vec<MessageView>> {
        let limit = limit.unwrap_or(DEFAULT_THREAD_LIMIT).clamp(1, MAX_THREAD_LIMIT);
        let messages = self.store.thread(user_id, counterpart_id, limit).await?;
        Ok(messages.iter().map(Message::view).collect())
    }
}
