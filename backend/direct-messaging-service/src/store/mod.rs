//! Persistence seams. Each trait has an in-memory implementation for tests
//! and single-node development, and a durable one (Postgres, disk).

use crate::error::AppResult;
use crate::models::{Message, PresenceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod postgres;
pub mod uploads;

pub use memory::{MemoryMessageStore, MemoryPresenceStore, MemoryUserDirectory};
pub use postgres::{PgMessageStore, PgPresenceStore, PgUserDirectory};
pub use uploads::{DiskUploadStore, MemoryUploadStore, UploadSession, UploadStore};

/// The marketplace's user registry, seen read-only from here.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool>;

    /// Called for every identity that passed credential verification.
    async fn remember(&self, _user_id: Uuid) -> AppResult<()> {
        Ok(())
    }
}

/// Row returned by [`MessageStore::mark_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMark {
    pub message: Message,
    /// True when this call set `read_at`.
    pub newly_read: bool,
}

/// Conditional writes return `None` when their precondition no longer holds,
/// so a concurrent transition is never silently overwritten.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &Message) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Replaces content and stamps `edited_at` unless the message is deleted.
    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>>;

    /// Stamps `deleted_at` unless already deleted.
    async fn soft_delete(&self, id: Uuid, deleted_at: DateTime<Utc>) -> AppResult<Option<Message>>;

    /// Stamps `read_at` only if unset. Returns the row as it stands afterwards.
    async fn mark_read(&self, id: Uuid, read_at: DateTime<Utc>) -> AppResult<Option<ReadMark>>;

    /// Stamps every unread, undeleted message from `sender_id` to `receiver_id`.
    /// Returns the ids that changed.
    async fn mark_all_read(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>>;

    /// Every non-deleted message sent or received by `user_id`.
    async fn messages_involving(&self, user_id: Uuid) -> AppResult<Vec<Message>>;

    /// The latest `limit` messages between two users, oldest first. Includes deleted ones.
    async fn thread(&self, user_a: Uuid, user_b: Uuid, limit: usize) -> AppResult<Vec<Message>>;
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Applies `record` unless a record with a later `changed_at` is stored.
    /// Returns whether it was applied.
    async fn record(&self, record: &PresenceRecord) -> AppResult<bool>;

    async fn get(&self, user_id: Uuid) -> AppResult<Option<PresenceRecord>>;
}
