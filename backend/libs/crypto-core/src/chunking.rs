//! Splitting and reassembly for resumable encrypted file transfer.
//!
//! The whole file is encrypted once with [`FileCipher`](crate::cipher::FileCipher)
//! and the resulting ciphertext is cut into fixed-size chunks indexed
//! `0..total_chunks`. Only the last chunk may be shorter than `chunk_size`.

use crate::cipher::{EncryptedFile, FileMetadata};
use crate::error::{CryptoError, CryptoResult};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Number of chunks needed for `total_len` bytes.
pub fn chunk_count(total_len: u64, chunk_size: usize) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    total_len.div_ceil(chunk_size as u64) as u32
}

/// Expected byte length of chunk `index`.
pub fn expected_chunk_len(index: u32, total_len: u64, chunk_size: usize) -> Option<usize> {
    let total_chunks = chunk_count(total_len, chunk_size);
    if index >= total_chunks {
        return None;
    }
    let start = index as u64 * chunk_size as u64;
    Some((total_len - start).min(chunk_size as u64) as usize)
}

/// Indices in `0..total_chunks` that have not been acknowledged, ascending.
pub fn missing_indices(total_chunks: u32, acknowledged: &BTreeSet<u32>) -> Vec<u32> {
    (0..total_chunks)
        .filter(|index| !acknowledged.contains(index))
        .collect()
}

/// Concatenates chunks strictly in index order.
///
/// Refuses when any index in `0..total_chunks` is absent.
pub fn reassemble(total_chunks: u32, chunks: &BTreeMap<u32, Vec<u8>>) -> CryptoResult<Vec<u8>> {
    let missing: Vec<u32> = (0..total_chunks)
        .filter(|index| !chunks.contains_key(index))
        .collect();
    if !missing.is_empty() {
        return Err(CryptoError::IncompleteTransfer { missing });
    }

    let total_len = chunks
        .range(0..total_chunks)
        .map(|(_, data)| data.len())
        .sum();
    let mut out = Vec::with_capacity(total_len);
    for (_, data) in chunks.range(0..total_chunks) {
        out.extend_from_slice(data);
    }
    Ok(out)
}

/// Sender-side view of one upload attempt.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    file_id: Uuid,
    chunk_size: usize,
    metadata: FileMetadata,
    payload: Vec<u8>,
}

impl ChunkPlan {
    pub fn new(file: EncryptedFile, chunk_size: usize) -> CryptoResult<Self> {
        Self::with_file_id(Uuid::new_v4(), file, chunk_size)
    }

    /// Rebuilds the plan for an interrupted attempt so its chunks keep the same tag.
    pub fn with_file_id(file_id: Uuid, file: EncryptedFile, chunk_size: usize) -> CryptoResult<Self> {
        if chunk_size == 0 {
            return Err(CryptoError::InvalidChunk(
                "chunk size must be positive".to_string(),
            ));
        }
        if file.ciphertext.is_empty() {
            return Err(CryptoError::InvalidChunk("empty payload".to_string()));
        }

        Ok(Self {
            file_id,
            chunk_size,
            metadata: file.metadata,
            payload: file.ciphertext,
        })
    }

    pub fn file_id(&self) -> Uuid {
        self.file_id
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Length of the encrypted payload being transferred.
    pub fn total_size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn total_chunks(&self) -> u32 {
        chunk_count(self.total_size(), self.chunk_size)
    }

    pub fn chunk(&self, index: u32) -> Option<&[u8]> {
        if index >= self.total_chunks() {
            return None;
        }
        let start = index as usize * self.chunk_size;
        let end = (start + self.chunk_size).min(self.payload.len());
        Some(&self.payload[start..end])
    }

    /// Chunks still to send given the receiver's acknowledged set.
    pub fn pending<'a>(
        &'a self,
        acknowledged: &BTreeSet<u32>,
    ) -> impl Iterator<Item = (u32, &'a [u8])> + 'a {
        missing_indices(self.total_chunks(), acknowledged)
            .into_iter()
            .filter_map(move |index| self.chunk(index).map(|data| (index, data)))
    }
}
