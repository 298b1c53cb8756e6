//! AES-256-GCM encryption for message text and file payloads.
//!
//! ## Blob format
//!
//! - Nonce (12 bytes): random per encryption
//! - Ciphertext (variable)
//! - Tag (16 bytes): authentication tag
//!
//! Message blobs are base64 encoded so they can travel as message `content`.
//! File blobs travel as raw bytes next to their [`FileMetadata`], which is
//! bound to the ciphertext as associated data.

use crate::error::{CryptoError, CryptoResult};
use crate::key_agreement::SharedSecret;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

const MESSAGE_AAD: &[u8] = b"bazaar-dm/message/v1";

pub(crate) fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub(crate) fn open(key: &[u8; 32], blob: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Decryption);
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}

/// Symmetric encryption of chat message payloads.
pub struct MessageCipher;

impl MessageCipher {
    pub fn encrypt(plaintext: &[u8], key: &SharedSecret) -> CryptoResult<Vec<u8>> {
        seal(key.as_bytes(), plaintext, MESSAGE_AAD)
    }

    pub fn decrypt(blob: &[u8], key: &SharedSecret) -> CryptoResult<Vec<u8>> {
        open(key.as_bytes(), blob, MESSAGE_AAD)
    }

    /// Encrypts text into a base64 blob suitable for a message `content` field.
    pub fn encrypt_text(plaintext: &str, key: &SharedSecret) -> CryptoResult<String> {
        let blob = Self::encrypt(plaintext.as_bytes(), key)?;
        Ok(general_purpose::STANDARD.encode(blob))
    }

    pub fn decrypt_text(encoded: &str, key: &SharedSecret) -> CryptoResult<String> {
        let blob = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::Decryption)?;
        let plaintext = Self::decrypt(&blob, key)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
    }
}

/// Sidecar metadata carried alongside an encrypted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

impl FileMetadata {
    fn associated_data(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|_| CryptoError::Encryption)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFile {
    pub metadata: FileMetadata,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Whole-file encryption; the result is what gets chunked for upload.
pub struct FileCipher;

impl FileCipher {
    pub fn encrypt(
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        key: &SharedSecret,
    ) -> CryptoResult<EncryptedFile> {
        let metadata = FileMetadata {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
        };
        let aad = metadata.associated_data()?;
        let ciphertext = seal(key.as_bytes(), bytes, &aad)?;
        Ok(EncryptedFile {
            metadata,
            ciphertext,
        })
    }

    pub fn decrypt(file: &EncryptedFile, key: &SharedSecret) -> CryptoResult<Vec<u8>> {
        let aad = file
            .metadata
            .associated_data()
            .map_err(|_| CryptoError::Decryption)?;
        let bytes = open(key.as_bytes(), &file.ciphertext, &aad)?;

        if bytes.len() as u64 != file.metadata.size {
            return Err(CryptoError::Decryption);
        }
        Ok(bytes)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
