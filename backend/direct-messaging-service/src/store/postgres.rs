use super::{MessageStore, PresenceStore, ReadMark, UserDirectory};
use crate::error::AppResult;
use crate::models::{Message, PresenceRecord, PresenceStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, reply_to, created_at, edited_at, read_at, deleted_at";

fn row_to_message(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        content: row.get("content"),
        reply_to: row.get("reply_to"),
        created_at: row.get("created_at"),
        edited_at: row.get("edited_at"),
        read_at: row.get("read_at"),
        deleted_at: row.get("deleted_at"),
    }
}

fn row_to_presence(row: &Row) -> PresenceRecord {
    let status: String = row.get("status");
    PresenceRecord {
        user_id: row.get("user_id"),
        status: PresenceStatus::from_db(&status),
        last_seen_at: row.get("last_seen_at"),
        changed_at: row.get("changed_at"),
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool,
}

impl PgUserDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)",
                &[&user_id],
            )
            .await?;
        Ok(row.get(0))
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: Pool,
}

impl PgMessageStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(&self, message: &Message) -> AppResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                &format!(
                    "INSERT INTO direct_messages ({MESSAGE_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
                ),
                &[
                    &message.id,
                    &message.sender_id,
                    &message.receiver_id,
                    &message.content,
                    &message.reply_to,
                    &message.created_at,
                    &message.edited_at,
                    &message.read_at,
                    &message.deleted_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {MESSAGE_COLUMNS} FROM direct_messages WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_message))
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE direct_messages SET content = $2, edited_at = $3 \
                     WHERE id = $1 AND deleted_at IS NULL RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&id, &content, &edited_at],
            )
            .await?;
        Ok(row.as_ref().map(row_to_message))
    }

    async fn soft_delete(&self, id: Uuid, deleted_at: DateTime<Utc>) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE direct_messages SET deleted_at = $2 \
                     WHERE id = $1 AND deleted_at IS NULL RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&id, &deleted_at],
            )
            .await?;
        Ok(row.as_ref().map(row_to_message))
    }

    async fn mark_read(&self, id: Uuid, read_at: DateTime<Utc>) -> AppResult<Option<ReadMark>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE direct_messages SET read_at = $2 \
                     WHERE id = $1 AND read_at IS NULL RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&id, &read_at],
            )
            .await?;
        if let Some(row) = row {
            return Ok(Some(ReadMark {
                message: row_to_message(&row),
                newly_read: true,
            }));
        }

        // Already read, or gone.
        let row = client
            .query_opt(
                &format!("SELECT {MESSAGE_COLUMNS} FROM direct_messages WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(|row| ReadMark {
            message: row_to_message(row),
            newly_read: false,
        }))
    }

    async fn mark_all_read(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "UPDATE direct_messages SET read_at = $3 \
                 WHERE sender_id = $1 AND receiver_id = $2 \
                   AND read_at IS NULL AND deleted_at IS NULL \
                 RETURNING id",
                &[&sender_id, &receiver_id, &read_at],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    async fn messages_involving(&self, user_id: Uuid) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM direct_messages \
                     WHERE (sender_id = $1 OR receiver_id = $1) AND deleted_at IS NULL"
                ),
                &[&user_id],
            )
            .await?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    async fn thread(&self, user_a: Uuid, user_b: Uuid, limit: usize) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM ( \
                       SELECT {MESSAGE_COLUMNS} FROM direct_messages \
                       WHERE (sender_id = $1 AND receiver_id = $2) \
                          OR (sender_id = $2 AND receiver_id = $1) \
                       ORDER BY created_at DESC, id DESC \
                       LIMIT $3 \
                     ) recent ORDER BY created_at ASC, id ASC"
                ),
                &[&user_a, &user_b, &limit],
            )
            .await?;
        Ok(rows.iter().map(row_to_message).collect())
    }
}

#[derive(Clone)]
pub struct PgPresenceStore {
    pool: Pool,
}

impl PgPresenceStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceStore for PgPresenceStore {
    async fn record(&self, record: &PresenceRecord) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let applied = client
            .execute(
                "INSERT INTO user_presence (user_id, status, last_seen_at, changed_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                   status = EXCLUDED.status, \
                   last_seen_at = COALESCE(EXCLUDED.last_seen_at, user_presence.last_seen_at), \
                   changed_at = EXCLUDED.changed_at \
                 WHERE user_presence.changed_at <= EXCLUDED.changed_at",
                &[
                    &record.user_id,
                    &record.status.as_str(),
                    &record.last_seen_at,
                    &record.changed_at,
                ],
            )
            .await?;
        Ok(applied > 0)
    }

    async fn get(&self, user_id: Uuid) -> AppResult<Option<PresenceRecord>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT user_id, status, last_seen_at, changed_at FROM user_presence WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_presence))
    }
}
