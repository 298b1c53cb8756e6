use super::{MessageStore, PresenceStore, ReadMark, UserDirectory};
use crate::error::{AppError, AppResult};
use crate::models::{Message, PresenceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashSet<Uuid>,
    /// Treat every verified identity as a known user.
    learn_verified: bool,
}

impl MemoryUserDirectory {
    /// Only the users passed in (or added later) exist.
    pub fn with_users(users: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            users: users.into_iter().collect(),
            learn_verified: false,
        }
    }

    /// Users become known as soon as they authenticate once.
    pub fn learning() -> Self {
        Self {
            users: DashSet::new(),
            learn_verified: true,
        }
    }

    pub fn add(&self, user_id: Uuid) {
        self.users.insert(user_id);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self.users.contains(&user_id))
    }

    async fn remember(&self, user_id: Uuid) -> AppResult<()> {
        if self.learn_verified {
            self.users.insert(user_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMessageStore {
    messages: DashMap<Uuid, Message>,
    unavailable: AtomicBool,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail like a lost database connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database("Closed: message store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: &Message) -> AppResult<()> {
        self.check_available()?;
        self.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
        self.check_available()?;
        Ok(self.messages.get(&id).map(|m| m.value().clone()))
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        self.check_available()?;
        let Some(mut message) = self.messages.get_mut(&id) else {
            return Ok(None);
        };
        if message.is_deleted() {
            return Ok(None);
        }
        message.content = content.to_string();
        message.edited_at = Some(edited_at);
        Ok(Some(message.value().clone()))
    }

    async fn soft_delete(&self, id: Uuid, deleted_at: DateTime<Utc>) -> AppResult<Option<Message>> {
        self.check_available()?;
        let Some(mut message) = self.messages.get_mut(&id) else {
            return Ok(None);
        };
        if message.is_deleted() {
            return Ok(None);
        }
        message.deleted_at = Some(deleted_at);
        Ok(Some(message.value().clone()))
    }

    async fn mark_read(&self, id: Uuid, read_at: DateTime<Utc>) -> AppResult<Option<ReadMark>> {
        self.check_available()?;
        let Some(mut message) = self.messages.get_mut(&id) else {
            return Ok(None);
        };
        let newly_read = message.read_at.is_none();
        if newly_read {
            message.read_at = Some(read_at);
        }
        Ok(Some(ReadMark {
            message: message.value().clone(),
            newly_read,
        }))
    }

    async fn mark_all_read(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        self.check_available()?;
        let mut marked = Vec::new();
        for mut entry in self.messages.iter_mut() {
            let message = entry.value_mut();
            if message.sender_id == sender_id
                && message.receiver_id == receiver_id
                && message.read_at.is_none()
                && !message.is_deleted()
            {
                message.read_at = Some(read_at);
                marked.push(message.id);
            }
        }
        Ok(marked)
    }

    async fn messages_involving(&self, user_id: Uuid) -> AppResult<Vec<Message>> {
        self.check_available()?;
        Ok(self
            .messages
            .iter()
            .filter(|m| m.involves(user_id) && !m.is_deleted())
            .map(|m| m.value().clone())
            .collect())
    }

    async fn thread(&self, user_a: Uuid, user_b: Uuid, limit: usize) -> AppResult<Vec<Message>> {
        self.check_available()?;
        let mut thread: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.counterpart_of(user_a) == Some(user_b))
            .map(|m| m.value().clone())
            .collect();
        thread.sort_by_key(|m| (m.created_at, m.id));
        let skip = thread.len().saturating_sub(limit);
        Ok(thread.split_off(skip))
    }
}

#[derive(Default)]
pub struct MemoryPresenceStore {
    records: DashMap<Uuid, PresenceRecord>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn record(&self, record: &PresenceRecord) -> AppResult<bool> {
        match self.records.entry(record.user_id) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                if stored.changed_at > record.changed_at {
                    return Ok(false);
                }
                let last_seen_at = record.last_seen_at.or(stored.last_seen_at);
                *stored = PresenceRecord {
                    last_seen_at,
                    ..record.clone()
                };
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn get(&self, user_id: Uuid) -> AppResult<Option<PresenceRecord>> {
        Ok(self.records.get(&user_id).map(|r| r.value().clone()))
    }
}
