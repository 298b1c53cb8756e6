use crate::error::AppResult;
use chrono::{DateTime, Utc};
use crypto_core::hash::key_fingerprint;
use crypto_core::KeyAgreementService;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A session public key as published by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedKey {
    pub user_id: Uuid,
    pub public_key: String,
    pub fingerprint: String,
    pub published_at: DateTime<Utc>,
}

/// Where partners look up each other's current session public key.
///
/// Keys are session-scoped: republishing replaces the previous key and
/// nothing here survives a restart.
#[derive(Default)]
pub struct KeyDirectory {
    keys: DashMap<Uuid, PublishedKey>,
}

impl KeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, user_id: Uuid, public_key: &str) -> AppResult<PublishedKey> {
        let key = KeyAgreementService::import_public_key(public_key)?;
        let published = PublishedKey {
            user_id,
            public_key: public_key.trim().to_string(),
            fingerprint: key_fingerprint(key.as_bytes()),
            published_at: Utc::now(),
        };
        self.keys.insert(user_id, published.clone());
        tracing::info!(%user_id, fingerprint = %published.fingerprint, "published session key");
        Ok(published)
    }

    pub fn get(&self, user_id: Uuid) -> Option<PublishedKey> {
        self.keys.get(&user_id).map(|k| k.value().clone())
    }

    pub fn revoke(&self, user_id: Uuid) -> bool {
        let removed = self.keys.remove(&user_id).is_some();
        if removed {
            tracing::info!(%user_id, "revoked session key");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crypto_core::LocalKeyPair;

    #[test]
    fn test_publish_and_lookup() {
        let directory = KeyDirectory::new();
        let user = Uuid::new_v4();
        let pair = LocalKeyPair::generate();

        let published = directory.publish(user, &pair.export_public_key()).unwrap();
        assert_eq!(published.fingerprint.len(), 16);
        assert_eq!(directory.get(user), Some(published));
    }

    #[test]
    fn test_republish_replaces() {
        let directory = KeyDirectory::new();
        let user = Uuid::new_v4();
        directory
            .publish(user, &LocalKeyPair::generate().export_public_key())
            .unwrap();
        let second = LocalKeyPair::generate().export_public_key();
        directory.publish(user, &second).unwrap();
        assert_eq!(directory.get(user).unwrap().public_key, second);
    }

    #[test]
    fn test_malformed_key_rejected() {
        let directory = KeyDirectory::new();
        let err = directory.publish(Uuid::new_v4(), "AAAA").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_revoke() {
        let directory = KeyDirectory::new();
        let user = Uuid::new_v4();
        directory
            .publish(user, &LocalKeyPair::generate().export_public_key())
            .unwrap();
        assert!(directory.revoke(user));
        assert!(!directory.revoke(user));
        assert!(directory.get(user).is_none());
    }
}
