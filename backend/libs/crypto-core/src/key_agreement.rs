//! X25519 key agreement between two conversation partners.
//!
//! Each participant generates one ephemeral key pair per session. Only the
//! public half is exported (base64, 32 bytes); the private half stays inside
//! [`LocalKeyPair`] and is zeroized when the pair is dropped.
//!
//! The raw Diffie-Hellman output is expanded with HKDF-SHA256 into a fixed
//! 256-bit [`SharedSecret`], so both parties end up with the same symmetric key:
//!
//! ```text
//! derive(A.private, B.public) == derive(B.private, A.public)
//! ```

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose, Engine as _};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SHARED_SECRET_LEN: usize = 32;

/// HKDF info label; changing it invalidates every previously agreed secret.
const SHARED_SECRET_INFO: &[u8] = b"bazaar-dm/shared-secret/v1";

/// 256-bit symmetric key agreed with one conversation partner.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Ephemeral key pair owned by one participant for the lifetime of a session.
///
/// The private scalar is never serialized, never printed and is wiped on drop.
pub struct LocalKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl LocalKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Transport-safe encoding of the public half.
    pub fn export_public_key(&self) -> String {
        general_purpose::STANDARD.encode(self.public.as_bytes())
    }

    pub fn derive_shared_secret(&self, peer_public_encoded: &str) -> CryptoResult<SharedSecret> {
        KeyAgreementService::derive_shared_secret(self, peer_public_encoded)
    }
}

impl fmt::Debug for LocalKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyPair")
            .field("public", &self.export_public_key())
            .finish_non_exhaustive()
    }
}

pub struct KeyAgreementService;

impl KeyAgreementService {
    pub fn generate_keypair() -> LocalKeyPair {
        LocalKeyPair::generate()
    }

    pub fn export_public_key(pair: &LocalKeyPair) -> String {
        pair.export_public_key()
    }

    /// Decodes and validates a peer public key received over the wire.
    pub fn import_public_key(encoded: &str) -> CryptoResult<PublicKey> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("base64 decode failed: {e}")))?;

        let array: [u8; PUBLIC_KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;

        Ok(PublicKey::from(array))
    }

    /// ECDH followed by HKDF-SHA256 expansion to a 256-bit secret.
    ///
    /// Low-order peer points produce a non-contributory output and are rejected.
    pub fn derive_shared_secret(
        own: &LocalKeyPair,
        peer_public_encoded: &str,
    ) -> CryptoResult<SharedSecret> {
        let peer = Self::import_public_key(peer_public_encoded)?;
        let dh = own.secret.diffie_hellman(&peer);

        if !dh.was_contributory() {
            return Err(CryptoError::KeyAgreement(
                "peer public key is a low-order point".to_string(),
            ));
        }

        let hk = Hkdf::<Sha256>::new(None, dh.as_bytes());
        let mut okm = [0u8; SHARED_SECRET_LEN];
        hk.expand(SHARED_SECRET_INFO, &mut okm)
            .map_err(|e| CryptoError::KeyAgreement(format!("HKDF expand failed: {e}")))?;

        let secret = SharedSecret::from_bytes(okm);
        okm.zeroize();
        Ok(secret)
    }
}
