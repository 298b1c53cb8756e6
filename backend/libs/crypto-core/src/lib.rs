//! Client-side end-to-end encryption primitives and credential verification
//! shared by the messaging service and its clients.

pub mod chunking;
pub mod cipher;
pub mod error;
pub mod hash;
pub mod jwt;
pub mod key_agreement;
pub mod secure_channel;
pub mod session_keys;

pub use chunking::{ChunkPlan, DEFAULT_CHUNK_SIZE};
pub use cipher::{EncryptedFile, FileCipher, FileMetadata, MessageCipher};
pub use error::{CryptoError, CryptoResult};
pub use key_agreement::{KeyAgreementService, LocalKeyPair, SharedSecret};
pub use secure_channel::SecureChannel;
pub use session_keys::SessionKeyStore;
