//! Client-side end-to-end encryption state for one browsing session.
//!
//! Ties together the session key pair, the per-partner secret store and the
//! ciphers. The server only ever sees public keys and ciphertext.

use crate::chunking::ChunkPlan;
use crate::cipher::{EncryptedFile, FileCipher, MessageCipher};
use crate::error::{CryptoError, CryptoResult};
use crate::key_agreement::{LocalKeyPair, SharedSecret};
use crate::session_keys::SessionKeyStore;
use tracing::info;
use uuid::Uuid;

pub struct SecureChannel {
    key_pair: LocalKeyPair,
    keys: SessionKeyStore,
}

impl Default for SecureChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureChannel {
    pub fn new() -> Self {
        Self {
            key_pair: LocalKeyPair::generate(),
            keys: SessionKeyStore::new(),
        }
    }

    /// Public key to publish to the key directory.
    pub fn public_key(&self) -> String {
        self.key_pair.export_public_key()
    }

    /// Agrees a secret with `partner_id` and keeps it for the session.
    pub fn establish(&self, partner_id: Uuid, peer_public_key: &str) -> CryptoResult<()> {
        let secret = self.key_pair.derive_shared_secret(peer_public_key)?;
        self.keys.store(partner_id, &secret)?;
        info!(%partner_id, "established end-to-end session key");
        Ok(())
    }

    pub fn is_established(&self, partner_id: Uuid) -> bool {
        self.keys.contains(partner_id)
    }

    fn secret_for(&self, partner_id: Uuid) -> CryptoResult<SharedSecret> {
        self.keys
            .retrieve(partner_id)?
            .ok_or(CryptoError::MissingSessionKey(partner_id))
    }

    pub fn seal_message(&self, partner_id: Uuid, plaintext: &str) -> CryptoResult<String> {
        let secret = self.secret_for(partner_id)?;
        MessageCipher::encrypt_text(plaintext, &secret)
    }

    pub fn open_message(&self, partner_id: Uuid, content: &str) -> CryptoResult<String> {
        let secret = self.secret_for(partner_id)?;
        MessageCipher::decrypt_text(content, &secret)
    }

    pub fn seal_file(
        &self,
        partner_id: Uuid,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
    ) -> CryptoResult<EncryptedFile> {
        let secret = self.secret_for(partner_id)?;
        FileCipher::encrypt(bytes, name, mime_type, &secret)
    }

    /// Encrypts and splits a file ready for chunked upload.
    pub fn prepare_upload(
        &self,
        partner_id: Uuid,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        chunk_size: usize,
    ) -> CryptoResult<ChunkPlan> {
        let file = self.seal_file(partner_id, bytes, name, mime_type)?;
        ChunkPlan::new(file, chunk_size)
    }

    pub fn open_file(&self, partner_id: Uuid, file: &EncryptedFile) -> CryptoResult<Vec<u8>> {
        let secret = self.secret_for(partner_id)?;
        FileCipher::decrypt(file, &secret)
    }

    /// Forgets the secret for one partner; the next exchange needs a new agreement.
    pub fn forget(&self, partner_id: Uuid) -> bool {
        self.keys.evict(partner_id)
    }

    /// New key pair and no partner secrets. Previously published keys become useless.
    pub fn rotate(&mut self) {
        self.keys.clear_all();
        self.key_pair = LocalKeyPair::generate();
        info!("rotated session key pair");
    }

    pub fn logout(&self) {
        self.keys.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paired() -> (SecureChannel, Uuid, SecureChannel, Uuid) {
        let alice = SecureChannel::new();
        let bob = SecureChannel::new();
        let alice_id = Uuid::new_v4();
        let bob_id = Uuid::new_v4();
        alice.establish(bob_id, &bob.public_key()).unwrap();
        bob.establish(alice_id, &alice.public_key()).unwrap();
        (alice, alice_id, bob, bob_id)
    }

    #[test]
    fn test_message_crosses_between_partners() {
        let (alice, alice_id, bob, bob_id) = paired();
        let sealed = alice.seal_message(bob_id, "hello").unwrap();
        assert_ne!(sealed, "hello");
        assert_eq!(bob.open_message(alice_id, &sealed).unwrap(), "hello");
    }

    #[test]
    fn test_missing_partner_key() {
        let channel = SecureChannel::new();
        let stranger = Uuid::new_v4();
        assert_eq!(
            channel.seal_message(stranger, "hi"),
            Err(CryptoError::MissingSessionKey(stranger))
        );
    }

    #[test]
    fn test_rotation_invalidates_old_secrets() {
        let (mut alice, alice_id, bob, bob_id) = paired();
        let sealed = bob.seal_message(alice_id, "before rotation").unwrap();

        alice.rotate();
        assert!(!alice.is_established(bob_id));

        // Re-agreeing with the stale peer view yields a different secret.
        alice.establish(bob_id, &bob.public_key()).unwrap();
        assert_eq!(
            alice.open_message(bob_id, &sealed),
            Err(CryptoError::Decryption)
        );
    }

    #[test]
    fn test_logout_clears_keys() {
        let (alice, _, _, bob_id) = paired();
        alice.logout();
        assert!(!alice.is_established(bob_id));
    }

    #[test]
    fn test_file_roundtrip() {
        let (alice, alice_id, bob, bob_id) = paired();
        let file = alice
            .seal_file(bob_id, b"%PDF-1.7 ...", "listing.pdf", "application/pdf")
            .unwrap();
        assert_eq!(bob.open_file(alice_id, &file).unwrap(), b"%PDF-1.7 ...");
    }
}
