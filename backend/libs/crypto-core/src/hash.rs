use sha2::{Digest, Sha256};

/// Compute SHA256 hash of input bytes
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Short hex fingerprint of a public key, safe to log and to compare out of band.
pub fn key_fingerprint(public_key: &[u8]) -> String {
    hex::encode(&sha256(public_key)[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let input = b"hello world";
        let hash = sha256(input);
        assert_eq!(hash.len(), 32);

        // Verify deterministic
        let hash2 = sha256(input);
        assert_eq!(hash, hash2);
    }

    #[test]
    fn test_key_fingerprint_length() {
        let fp = key_fingerprint(&[1u8; 32]);
        assert_eq!(fp.len(), 16);
        assert_ne!(fp, key_fingerprint(&[2u8; 32]));
    }
}
