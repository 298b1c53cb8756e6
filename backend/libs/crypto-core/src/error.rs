use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key agreement failed: {0}")]
    KeyAgreement(String),

    #[error("encryption error")]
    Encryption,

    /// Wrong key, tampered or truncated ciphertext. Never carries partial plaintext.
    #[error("decryption error")]
    Decryption,

    #[error("no session key for partner {0}")]
    MissingSessionKey(Uuid),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("transfer incomplete: {} chunk(s) missing", missing.len())]
    IncompleteTransfer { missing: Vec<u32> },

    #[error("token validation failed: {0}")]
    Token(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
