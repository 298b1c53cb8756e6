use super::message_types::{ClientEvent, ServerEvent};
use super::TransportId;
use crate::error::{AppError, AppResult};
use crate::services::{MessageLifecycleManager, ReadTarget};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

/// Routes decoded client events to the lifecycle manager on behalf of an
/// authenticated identity.
#[derive(Clone)]
pub struct EventDispatcher {
    lifecycle: Arc<MessageLifecycleManager>,
}

impl EventDispatcher {
    pub fn new(lifecycle: Arc<MessageLifecycleManager>) -> Self {
        Self { lifecycle }
    }

    /// Returns the frame owed to the originating transport, if any.
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        transport_id: TransportId,
        event: ClientEvent,
    ) -> AppResult<Option<ServerEvent>> {
        tracing::debug!(%user_id, %transport_id, event = event.event_type(), "dispatching");

        match event {
            ClientEvent::SendMessage {
                receiver_id,
                content,
                reply_to,
            } => {
                let message = self
                    .lifecycle
                    .create(user_id, receiver_id, &content, reply_to, Some(transport_id))
                    .await?;
                Ok(Some(ServerEvent::MessageSent(message.view())))
            }
            ClientEvent::EditMessage {
                message_id,
                content,
            } => {
                self.lifecycle.edit(message_id, user_id, &content).await?;
                Ok(None)
            }
            ClientEvent::DeleteMessage { message_id } => {
                self.lifecycle.soft_delete(message_id, user_id).await?;
                Ok(None)
            }
            ClientEvent::Typing { receiver_id } => {
                self.lifecycle.set_typing(user_id, receiver_id, transport_id)?;
                Ok(None)
            }
            ClientEvent::StopTyping { receiver_id } => {
                self.lifecycle.clear_typing(user_id, receiver_id);
                Ok(None)
            }
            ClientEvent::MessageRead {
                message_id,
                sender_id,
            } => {
                let target = match (message_id, sender_id) {
                    (Some(id), None) => ReadTarget::Message(id),
                    (None, Some(sender)) => ReadTarget::AllFrom(sender),
                    _ => {
                        return Err(AppError::Validation(
                            "message_read needs exactly one of messageId or senderId".into(),
                        ))
                    }
                };
                self.lifecycle.mark_read(target, user_id).await?;
                Ok(None)
            }
        }
    }

    /// Decodes a raw frame and dispatches it; every failure becomes a
    /// `message_error` for the originating transport only.
    pub async fn handle_frame(
        &self,
        user_id: Uuid,
        transport_id: TransportId,
        frame: &str,
    ) -> Option<ServerEvent> {
        let event = match serde_json::from_str::<ClientEvent>(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "malformed client event");
                return Some(error_event(&AppError::Validation(format!(
                    "malformed event: {e}"
                ))));
            }
        };

        match self.dispatch(user_id, transport_id, event).await {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, AppError::Database(_) | AppError::Internal) {
                    tracing::error!(%user_id, error = %e, "event failed");
                } else {
                    tracing::debug!(%user_id, error = %e, "event rejected");
                }
                Some(error_event(&e))
            }
        }
    }

    /// Handles one transport's frames strictly in arrival order until the
    /// sending side closes, passing every reply to `reply`.
    pub async fn drain_frames<F>(
        &self,
        user_id: Uuid,
        transport_id: TransportId,
        mut frames: UnboundedReceiver<String>,
        mut reply: F,
    ) where
        F: FnMut(ServerEvent),
    {
        while let Some(frame) = frames.recv().await {
            if let Some(event) = self.handle_frame(user_id, transport_id, &frame).await {
                reply(event);
            }
        }
        tracing::debug!(%user_id, %transport_id, "frame queue closed");
    }
}

pub fn error_event(error: &AppError) -> ServerEvent {
    ServerEvent::MessageError {
        error: error.code().to_string(),
        details: error.public_details(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use crate::store::{MemoryMessageStore, MemoryUserDirectory, MessageStore, ReadMark};
    use crate::websocket::ConnectionRegistry;
    use chrono::{DateTime, Utc};

    fn dispatcher(users: &[Uuid]) -> EventDispatcher {
        let lifecycle = MessageLifecycleManager::new(
            Arc::new(MemoryMessageStore::new()),
            Arc::new(MemoryUserDirectory::with_users(users.iter().copied())),
            ConnectionRegistry::new(),
            1000,
        );
        EventDispatcher::new(Arc::new(lifecycle))
    }

    #[tokio::test]
    async fn test_send_message_is_acknowledged() {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let d = dispatcher(&[alice, bob]);
        let frame = serde_json::json!({"type": "send_message", "receiverId": bob, "content": "hi"});

        let reply = d.handle_frame(alice, TransportId::new(), &frame.to_string()).await;
        match reply {
            Some(ServerEvent::MessageSent(view)) => {
                assert_eq!(view.sender_id, alice);
                assert_eq!(view.content.as_deref(), Some("hi"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_becomes_error_event() {
        let d = dispatcher(&[]);
        let reply = d.handle_frame(Uuid::new_v4(), TransportId::new(), "{not json").await;
        assert!(matches!(
            reply,
            Some(ServerEvent::MessageError { ref error, .. }) if error == "validation_error"
        ));
    }

    #[tokio::test]
    async fn test_read_requires_exactly_one_target() {
        let d = dispatcher(&[]);
        let both = ClientEvent::MessageRead {
            message_id: Some(Uuid::new_v4()),
            sender_id: Some(Uuid::new_v4()),
        };
        let neither = ClientEvent::MessageRead {
            message_id: None,
            sender_id: None,
        };
        for event in [both, neither] {
            let err = d
                .dispatch(Uuid::new_v4(), TransportId::new(), event)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_forbidden_edit_reports_without_details() {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let d = dispatcher(&[alice, bob]);
        let sent = d
            .dispatch(
                alice,
                TransportId::new(),
                ClientEvent::SendMessage {
                    receiver_id: bob,
                    content: "hi".into(),
                    reply_to: None,
                },
            )
            .await
            .unwrap();
        let Some(ServerEvent::MessageSent(view)) = sent else {
            panic!("expected ack");
        };

        let frame = serde_json::json!({"type": "edit_message", "messageId": view.id, "content": "x"});
        let reply = d.handle_frame(bob, TransportId::new(), &frame.to_string()).await;
        assert_eq!(
            reply,
            Some(ServerEvent::MessageError {
                error: "authorization_error".into(),
                details: None
            })
        );
    }

    /// Memory store whose first insert stalls, so a later frame would
    /// overtake it if frames were handled concurrently.
    struct SlowFirstInsert {
        inner: MemoryMessageStore,
        inserts: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MessageStore for SlowFirstInsert {
        async fn insert(&self, message: &Message) -> AppResult<()> {
            use std::sync::atomic::Ordering;
            if self.inserts.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            self.inner.insert(message).await
        }
        async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
            self.inner.get(id).await
        }
        async fn update_content(
            &self,
            id: Uuid,
            content: &str,
            edited_at: DateTime<Utc>,
        ) -> AppResult<Option<Message>> {
            self.inner.update_content(id, content, edited_at).await
        }
        async fn soft_delete(&self, id: Uuid, deleted_at: DateTime<Utc>) -> AppResult<Option<Message>> {
            self.inner.soft_delete(id, deleted_at).await
        }
        async fn mark_read(&self, id: Uuid, read_at: DateTime<Utc>) -> AppResult<Option<ReadMark>> {
            self.inner.mark_read(id, read_at).await
        }
        async fn mark_all_read(
            &self,
            sender_id: Uuid,
            receiver_id: Uuid,
            read_at: DateTime<Utc>,
        ) -> AppResult<Vec<Uuid>> {
            self.inner.mark_all_read(sender_id, receiver_id, read_at).await
        }
        async fn messages_involving(&self, user_id: Uuid) -> AppResult<Vec<Message>> {
            self.inner.messages_involving(user_id).await
        }
        async fn thread(&self, user_a: Uuid, user_b: Uuid, limit: usize) -> AppResult<Vec<Message>> {
            self.inner.thread(user_a, user_b, limit).await
        }
    }

    #[tokio::test]
    async fn test_frames_of_one_transport_are_handled_in_order() {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let store = Arc::new(SlowFirstInsert {
            inner: MemoryMessageStore::new(),
            inserts: Default::default(),
        });
        let lifecycle = MessageLifecycleManager::new(
            store.clone(),
            Arc::new(MemoryUserDirectory::with_users([alice, bob])),
            ConnectionRegistry::new(),
            1000,
        );
        let d = EventDispatcher::new(Arc::new(lifecycle));

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        for content in ["first", "second", "third"] {
            let frame = serde_json::json!({"type": "send_message", "receiverId": bob, "content": content});
            tx.send(frame.to_string()).unwrap();
        }
        drop(tx);

        let mut acked = Vec::new();
        d.drain_frames(alice, TransportId::new(), rx, |event| {
            if let ServerEvent::MessageSent(view) = event {
                acked.push(view.content.unwrap_or_default());
            }
        })
        .await;

        assert_eq!(acked, vec!["first", "second", "third"]);
        let thread = store.inner.thread(alice, bob, 10).await.unwrap();
        let stored: Vec<&str> = thread.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(stored, vec!["first", "second", "third"]);
    }
}
