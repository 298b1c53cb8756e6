//! Resumable chunked transfer of encrypted files.
//!
//! Clients encrypt the whole file first, then upload the ciphertext in
//! fixed-size chunks tagged with the upload's `file_id`. After an
//! interruption they ask for the missing indices and send only those.
//! Completion refuses to reassemble while any index is missing.

use crate::error::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::store::{UploadSession, UploadStore};
use chrono::Utc;
use std::time::Duration;
use crypto_core::chunking::{chunk_count, reassemble};
use crypto_core::{EncryptedFile, FileMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Largest chunk a client may negotiate.
pub const MAX_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Upper bound on chunks per upload. Bounds the missing-index list and the
/// manifest rewritten for every chunk.
pub const MAX_TOTAL_CHUNKS: u32 = 4096;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUpload {
    pub recipient_id: Uuid,
    pub metadata: FileMetadata,
    /// Length of the encrypted payload.
    pub total_size: u64,
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub file_id: Uuid,
    pub chunk_size: usize,
    pub total_chunks: u32,
    pub received: usize,
    pub missing: Vec<u32>,
    pub complete: bool,
}

impl From<&UploadSession> for UploadStatus {
    fn from(session: &UploadSession) -> Self {
        Self {
            file_id: session.file_id,
            chunk_size: session.chunk_size,
            total_chunks: session.total_chunks,
            received: session.acknowledged.len(),
            missing: session.missing(),
            complete: session.is_complete(),
        }
    }
}

pub struct ChunkedUploadManager {
    store: Arc<dyn UploadStore>,
    locks: KeyedLocks<Uuid>,
    default_chunk_size: usize,
    max_file_size: u64,
}

impl ChunkedUploadManager {
    pub fn new(store: Arc<dyn UploadStore>, default_chunk_size: usize, max_file_size: u64) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            default_chunk_size,
            max_file_size,
        }
    }

    pub async fn start(&self, uploader_id: Uuid, request: StartUpload) -> AppResult<UploadStatus> {
        if request.recipient_id == uploader_id {
            return Err(AppError::Validation("cannot send a file to yourself".into()));
        }
        if request.metadata.name.trim().is_empty() {
            return Err(AppError::Validation("file name must not be empty".into()));
        }
        if request.total_size == 0 {
            return Err(AppError::Validation("file is empty".into()));
        }
        if request.total_size > self.max_file_size {
            return Err(AppError::Validation(format!(
                "file exceeds {} bytes",
                self.max_file_size
            )));
        }
        let chunk_size = request.chunk_size.unwrap_or(self.default_chunk_size);
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(AppError::Validation(format!(
                "chunk size must be between 1 and {MAX_CHUNK_SIZE}"
            )));
        }

        let total_chunks = chunk_count(request.total_size, chunk_size);
        if total_chunks > MAX_TOTAL_CHUNKS {
            return Err(AppError::Validation(format!(
                "{total_chunks} chunks exceeds the limit of {MAX_TOTAL_CHUNKS}; use a larger chunk size"
            )));
        }

        let session = UploadSession {
            file_id: Uuid::new_v4(),
            uploader_id,
            recipient_id: request.recipient_id,
            metadata: request.metadata,
            total_size: request.total_size,
            chunk_size,
            total_chunks,
            acknowledged: BTreeSet::new(),
            created_at: Utc::now(),
        };
        self.store.create(&session).await?;

        info!(
            file_id = %session.file_id,
            %uploader_id,
            total_chunks = session.total_chunks,
            "upload started"
        );
        Ok(UploadStatus::from(&session))
    }

    async fn owned_session(&self, uploader_id: Uuid, file_id: Uuid) -> AppResult<UploadSession> {
        let session = self.store.load(file_id).await?.ok_or(AppError::NotFound)?;
        if session.uploader_id != uploader_id {
            return Err(AppError::Forbidden);
        }
        Ok(session)
    }

    /// Stores chunk `index`. Re-sending an acknowledged chunk is accepted and
    /// leaves the stored bytes untouched.
    pub async fn accept_chunk(
        &self,
        uploader_id: Uuid,
        file_id: Uuid,
        index: u32,
        data: &[u8],
    ) -> AppResult<UploadStatus> {
        let _guard = self.locks.lock(file_id).await;
        let session = self.owned_session(uploader_id, file_id).await?;

        let expected = session.expected_chunk_len(index).ok_or_else(|| {
            AppError::Validation(format!(
                "chunk index {index} out of range 0..{}",
                session.total_chunks
            ))
        })?;
        if data.len() != expected {
            return Err(AppError::Validation(format!(
                "chunk {index} must be {expected} bytes, got {}",
                data.len()
            )));
        }

        if session.acknowledged.contains(&index) {
            debug!(%file_id, index, "duplicate chunk ignored");
            return Ok(UploadStatus::from(&session));
        }

        let session = self
            .store
            .put_chunk(file_id, index, data)
            .await?
            .ok_or(AppError::NotFound)?;
        debug!(%file_id, index, received = session.acknowledged.len(), "chunk stored");
        Ok(UploadStatus::from(&session))
    }

    pub async fn status(&self, uploader_id: Uuid, file_id: Uuid) -> AppResult<UploadStatus> {
        let session = self.owned_session(uploader_id, file_id).await?;
        Ok(UploadStatus::from(&session))
    }

    /// Drops uploads older than `max_age`, complete or not. Returns how many went.
    pub async fn sweep_expired(&self, max_age: Duration) -> AppResult<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|_| AppError::Validation("upload max age out of range".into()))?;
        let cutoff = Utc::now() - max_age;

        let mut swept = 0;
        for file_id in self.store.created_before(cutoff).await? {
            let _guard = self.locks.lock(file_id).await;
            // Completed meanwhile.
            let Some(session) = self.store.load(file_id).await? else {
                continue;
            };
            if session.created_at < cutoff {
                self.store.discard(file_id).await?;
                swept += 1;
            }
        }
        if swept > 0 {
            info!(swept, "expired uploads discarded");
        }
        Ok(swept)
    }

    /// Reassembles the payload in index order and releases the upload's storage.
    pub async fn complete(&self, uploader_id: Uuid, file_id: Uuid) -> AppResult<EncryptedFile> {
        let _guard = self.locks.lock(file_id).await;
        let session = self.owned_session(uploader_id, file_id).await?;

        let missing = session.missing();
        if !missing.is_empty() {
            return Err(AppError::IncompleteUpload { missing });
        }

        let chunks = self.store.read_chunks(file_id).await?;
        let ciphertext = reassemble(session.total_chunks, &chunks)?;
        if ciphertext.len() as u64 != session.total_size {
            return Err(AppError::Storage(format!(
                "reassembled {} bytes, expected {}",
                ciphertext.len(),
                session.total_size
            )));
        }

        self.store.discard(file_id).await?;
        info!(%file_id, bytes = ciphertext.len(), "upload complete");

        Ok(EncryptedFile {
            metadata: session.metadata,
            ciphertext,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUploadStore;

    fn manager() -> ChunkedUploadManager {
        ChunkedUploadManager::new(Arc::new(MemoryUploadStore::new()), 4, 1024)
    }

    fn request(total_size: u64) -> StartUpload {
        StartUpload {
            recipient_id: Uuid::new_v4(),
            metadata: FileMetadata {
                name: "receipt.png".into(),
                mime_type: "image/png".into(),
                size: 1,
            },
            total_size,
            chunk_size: None,
        }
    }

    #[tokio::test]
    async fn test_start_validates_request() {
        let m = manager();
        let me = Uuid::new_v4();
        assert!(m.start(me, request(0)).await.is_err());
        assert!(m.start(me, request(2048)).await.is_err());

        let mut to_self = request(10);
        to_self.recipient_id = me;
        assert!(m.start(me, to_self).await.is_err());

        let status = m.start(me, request(10)).await.unwrap();
        assert_eq!(status.total_chunks, 3);
        assert_eq!(status.missing, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_chunk_length_and_range_checked() {
        let m = manager();
        let me = Uuid::new_v4();
        let file_id = m.start(me, request(10)).await.unwrap().file_id;

        assert!(m.accept_chunk(me, file_id, 3, b"xx").await.is_err());
        assert!(m.accept_chunk(me, file_id, 0, b"xx").await.is_err());
        // Tail chunk is short.
        let status = m.accept_chunk(me, file_id, 2, b"yz").await.unwrap();
        assert_eq!(status.missing, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_only_uploader_can_touch_upload() {
        let m = manager();
        let me = Uuid::new_v4();
        let file_id = m.start(me, request(4)).await.unwrap().file_id;
        let other = Uuid::new_v4();

        assert_eq!(m.accept_chunk(other, file_id, 0, b"abcd").await, Err(AppError::Forbidden));
        assert_eq!(m.status(other, file_id).await, Err(AppError::Forbidden));
        assert!(matches!(m.complete(other, file_id).await, Err(AppError::Forbidden)));
        assert_eq!(m.status(me, Uuid::new_v4()).await, Err(AppError::NotFound));
    }

    #[tokio::test]
    async fn test_complete_refuses_gaps_then_reassembles_in_order() {
        let m = manager();
        let me = Uuid::new_v4();
        let file_id = m.start(me, request(10)).await.unwrap().file_id;

        m.accept_chunk(me, file_id, 2, b"ij").await.unwrap();
        m.accept_chunk(me, file_id, 0, b"abcd").await.unwrap();
        assert!(matches!(
            m.complete(me, file_id).await,
            Err(AppError::IncompleteUpload { missing }) if missing == vec![1]
        ));

        m.accept_chunk(me, file_id, 1, b"efgh").await.unwrap();
        // Duplicate with different bytes does not overwrite.
        m.accept_chunk(me, file_id, 1, b"XXXX").await.unwrap();

        let file = m.complete(me, file_id).await.unwrap();
        assert_eq!(file.ciphertext, b"abcdefghij");
        assert_eq!(file.metadata.name, "receipt.png");
        assert_eq!(m.status(me, file_id).await, Err(AppError::NotFound));
    }

    #[tokio::test]
    async fn test_tiny_chunk_size_rejected_for_large_file() {
        let m = ChunkedUploadManager::new(Arc::new(MemoryUploadStore::new()), 1 << 20, 100 << 20);
        let me = Uuid::new_v4();

        let mut tiny = request(100 << 20);
        tiny.chunk_size = Some(1);
        assert!(matches!(m.start(me, tiny).await, Err(AppError::Validation(_))));

        let mut at_limit = request(u64::from(MAX_TOTAL_CHUNKS) * 1024);
        at_limit.chunk_size = Some(1024);
        let status = m.start(me, at_limit).await.unwrap();
        assert_eq!(status.total_chunks, MAX_TOTAL_CHUNKS);

        let mut over_limit = request(u64::from(MAX_TOTAL_CHUNKS) * 1024 + 1);
        over_limit.chunk_size = Some(1024);
        assert!(m.start(me, over_limit).await.is_err());

        // A single short chunk is fine whatever its size.
        let mut small_file = request(10);
        small_file.chunk_size = Some(16);
        assert_eq!(m.start(me, small_file).await.unwrap().total_chunks, 1);
    }

    #[tokio::test]
    async fn test_sweep_discards_only_expired_uploads() {
        let store = Arc::new(MemoryUploadStore::new());
        let m = ChunkedUploadManager::new(store.clone(), 4, 1024);
        let me = Uuid::new_v4();

        let fresh = m.start(me, request(10)).await.unwrap().file_id;
        let mut stale = store.load(fresh).await.unwrap().unwrap();
        stale.file_id = Uuid::new_v4();
        stale.created_at = Utc::now() - chrono::Duration::days(2);
        store.create(&stale).await.unwrap();

        assert_eq!(m.sweep_expired(Duration::from_secs(24 * 3600)).await.unwrap(), 1);
        assert_eq!(m.status(me, stale.file_id).await, Err(AppError::NotFound));
        assert!(m.status(me, fresh).await.is_ok());
        assert_eq!(m.sweep_expired(Duration::from_secs(24 * 3600)).await.unwrap(), 0);
    }
}
