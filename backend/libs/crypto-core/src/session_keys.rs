//! Volatile store of per-partner shared secrets.
//!
//! Secrets are wrapped with AES-256-GCM under a master key that is generated
//! when the store is created and wiped when it is dropped. Nothing here is
//! ever written to durable storage: a new browsing session means a new store
//! and a fresh key agreement with every partner.

use crate::cipher::{open, seal};
use crate::error::{CryptoError, CryptoResult};
use crate::key_agreement::{SharedSecret, SHARED_SECRET_LEN};
use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};
use tracing::debug;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey([u8; 32]);

impl MasterKey {
    fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }
}

pub struct SessionKeyStore {
    master_key: MasterKey,
    // partner_id -> wrapped secret (nonce || ciphertext || tag)
    wrapped: DashMap<Uuid, Vec<u8>>,
}

impl Default for SessionKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionKeyStore {
    pub fn new() -> Self {
        Self {
            master_key: MasterKey::generate(),
            wrapped: DashMap::new(),
        }
    }

    /// Wraps and stores the secret for `partner_id`, replacing any previous one.
    pub fn store(&self, partner_id: Uuid, secret: &SharedSecret) -> CryptoResult<()> {
        let wrapped = seal(&self.master_key.0, secret.as_bytes(), partner_id.as_bytes())?;
        self.wrapped.insert(partner_id, wrapped);
        debug!(%partner_id, "stored session key");
        Ok(())
    }

    pub fn retrieve(&self, partner_id: Uuid) -> CryptoResult<Option<SharedSecret>> {
        let Some(entry) = self.wrapped.get(&partner_id) else {
            return Ok(None);
        };

        let mut raw = open(&self.master_key.0, entry.value(), partner_id.as_bytes())?;
        let bytes: [u8; SHARED_SECRET_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Decryption)?;
        raw.zeroize();

        Ok(Some(SharedSecret::from_bytes(bytes)))
    }

    pub fn contains(&self, partner_id: Uuid) -> bool {
        self.wrapped.contains_key(&partner_id)
    }

    /// Returns true when a key was present.
    pub fn evict(&self, partner_id: Uuid) -> bool {
        let removed = self.wrapped.remove(&partner_id).is_some();
        if removed {
            debug!(%partner_id, "evicted session key");
        }
        removed
    }

    pub fn clear_all(&self) {
        let count = self.wrapped.len();
        self.wrapped.clear();
        debug!(count, "cleared all session keys");
    }

    pub fn len(&self) -> usize {
        self.wrapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrapped.is_empty()
    }
}
