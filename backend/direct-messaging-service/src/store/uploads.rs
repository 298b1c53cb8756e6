//! Persistence for resumable uploads.
//!
//! A session records which chunk indices have been durably stored. An index
//! is only added to `acknowledged` after its bytes are persisted, so a
//! restart never reports a chunk the store cannot produce.

use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crypto_core::chunking::{expected_chunk_len, missing_indices};
use crypto_core::FileMetadata;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub file_id: Uuid,
    pub uploader_id: Uuid,
    pub recipient_id: Uuid,
    pub metadata: FileMetadata,
    /// Length of the encrypted payload, not of the plaintext file.
    pub total_size: u64,
    pub chunk_size: usize,
    pub total_chunks: u32,
    pub acknowledged: BTreeSet<u32>,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn missing(&self) -> Vec<u32> {
        missing_indices(self.total_chunks, &self.acknowledged)
    }

    pub fn is_complete(&self) -> bool {
        self.acknowledged.len() as u32 == self.total_chunks
    }

    pub fn expected_chunk_len(&self, index: u32) -> Option<usize> {
        expected_chunk_len(index, self.total_size, self.chunk_size)
    }
}

/// Callers serialize access per `file_id`.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn create(&self, session: &UploadSession) -> AppResult<()>;

    async fn load(&self, file_id: Uuid) -> AppResult<Option<UploadSession>>;

    /// Stores the bytes, then marks `index` acknowledged. Returns the updated session.
    async fn put_chunk(&self, file_id: Uuid, index: u32, data: &[u8]) -> AppResult<Option<UploadSession>>;

    async fn read_chunks(&self, file_id: Uuid) -> AppResult<BTreeMap<u32, Vec<u8>>>;

    async fn discard(&self, file_id: Uuid) -> AppResult<()>;

    /// Uploads started before `cutoff`.
    async fn created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>>;
}

struct StoredUpload {
    session: UploadSession,
    chunks: BTreeMap<u32, Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryUploadStore {
    uploads: DashMap<Uuid, StoredUpload>,
}

impl MemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadStore for MemoryUploadStore {
    async fn create(&self, session: &UploadSession) -> AppResult<()> {
        self.uploads.insert(
            session.file_id,
            StoredUpload {
                session: session.clone(),
                chunks: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn load(&self, file_id: Uuid) -> AppResult<Option<UploadSession>> {
        Ok(self.uploads.get(&file_id).map(|u| u.session.clone()))
    }

    async fn put_chunk(&self, file_id: Uuid, index: u32, data: &[u8]) -> AppResult<Option<UploadSession>> {
        let Some(mut upload) = self.uploads.get_mut(&file_id) else {
            return Ok(None);
        };
        upload.chunks.insert(index, data.to_vec());
        upload.session.acknowledged.insert(index);
        Ok(Some(upload.session.clone()))
    }

    async fn read_chunks(&self, file_id: Uuid) -> AppResult<BTreeMap<u32, Vec<u8>>> {
        Ok(self
            .uploads
            .get(&file_id)
            .map(|u| u.chunks.clone())
            .unwrap_or_default())
    }

    async fn discard(&self, file_id: Uuid) -> AppResult<()> {
        self.uploads.remove(&file_id);
        Ok(())
    }

    async fn created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        Ok(self
            .uploads
            .iter()
            .filter(|u| u.session.created_at < cutoff)
            .map(|u| *u.key())
            .collect())
    }
}

/// One directory per upload: `manifest.json` plus one file per chunk.
/// Survives process restarts.
pub struct DiskUploadStore {
    root: PathBuf,
}

impl DiskUploadStore {
    pub async fn open(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn upload_dir(&self, file_id: Uuid) -> PathBuf {
        self.root.join(file_id.to_string())
    }

    fn manifest_path(&self, file_id: Uuid) -> PathBuf {
        self.upload_dir(file_id).join("manifest.json")
    }

    fn chunk_path(&self, file_id: Uuid, index: u32) -> PathBuf {
        self.upload_dir(file_id).join(format!("{index:08}.chunk"))
    }

    async fn write_manifest(&self, session: &UploadSession) -> AppResult<()> {
        let bytes = serde_json::to_vec_pretty(session)?;
        write_atomic(&self.manifest_path(session.file_id), &bytes).await
    }
}

/// Write to a sibling temp file and rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl UploadStore for DiskUploadStore {
    async fn create(&self, session: &UploadSession) -> AppResult<()> {
        fs::create_dir_all(self.upload_dir(session.file_id)).await?;
        self.write_manifest(session).await
    }

    async fn load(&self, file_id: Uuid) -> AppResult<Option<UploadSession>> {
        match fs::read(self.manifest_path(file_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_chunk(&self, file_id: Uuid, index: u32, data: &[u8]) -> AppResult<Option<UploadSession>> {
        let Some(mut session) = self.load(file_id).await? else {
            return Ok(None);
        };
        write_atomic(&self.chunk_path(file_id, index), data).await?;
        session.acknowledged.insert(index);
        self.write_manifest(&session).await?;
        Ok(Some(session))
    }

    async fn read_chunks(&self, file_id: Uuid) -> AppResult<BTreeMap<u32, Vec<u8>>> {
        let Some(session) = self.load(file_id).await? else {
            return Ok(BTreeMap::new());
        };
        let mut chunks = BTreeMap::new();
        for index in &session.acknowledged {
            let data = fs::read(self.chunk_path(file_id, *index)).await?;
            chunks.insert(*index, data);
        }
        Ok(chunks)
    }

    async fn discard(&self, file_id: Uuid) -> AppResult<()> {
        match fs::remove_dir_all(self.upload_dir(file_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let mut expired = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(file_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };
            // No manifest yet means `create` is still running.
            if let Some(session) = self.load(file_id).await? {
                if session.created_at < cutoff {
                    expired.push(file_id);
                }
            }
        }
        Ok(expired)
    }
}
