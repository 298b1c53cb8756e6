/// Credential verification for connecting clients.
///
/// Tokens are issued elsewhere; this service only validates them.
///
/// ## Security Design
///
/// - **RS256 ONLY**: no symmetric algorithms, which rules out algorithm confusion
/// - **No hardcoded keys**: the public key is supplied by configuration
/// - **Access tokens only**: refresh tokens are rejected for connections
use crate::error::{CryptoError, CryptoResult};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const JWT_ALGORITHM: Algorithm = Algorithm::RS256;

/// Claims consumed by the messaging service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// "access" or "refresh"; absent is treated as access
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    pub fn from_rsa_pem(public_key_pem: &str) -> CryptoResult<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("failed to parse RSA public key: {e}")))?;
        Ok(Self { decoding_key })
    }

    pub fn validate(&self, token: &str) -> CryptoResult<TokenData<Claims>> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| CryptoError::Token(e.to_string()))
    }

    /// Validates the token and returns the user it was issued to.
    pub fn verify(&self, token: &str) -> CryptoResult<Uuid> {
        let data = self.validate(token)?;

        if data.claims.token_type.as_deref() == Some("refresh") {
            return Err(CryptoError::Token("refresh token not accepted".to_string()));
        }

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| CryptoError::Token("subject is not a user id".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    // Test RSA key pair - FOR TESTING ONLY
    const TEST_PRIVATE_KEY: &str = include_str!("../testdata/jwt_test_private.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("../testdata/jwt_test_public.pem");

    fn token(sub: &str, token_type: Option<&str>, expires_in: Duration) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            token_type: token_type.map(str::to_string),
        };
        let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes()).unwrap();
        encode(&Header::new(JWT_ALGORITHM), &claims, &key).unwrap()
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::from_rsa_pem(TEST_PUBLIC_KEY).unwrap()
    }

    #[test]
    fn test_verify_valid_access_token() {
        let user_id = Uuid::new_v4();
        let t = token(&user_id.to_string(), Some("access"), Duration::hours(1));
        assert_eq!(verifier().verify(&t).unwrap(), user_id);
    }

    #[test]
    fn test_rejects_refresh_token() {
        let t = token(&Uuid::new_v4().to_string(), Some("refresh"), Duration::hours(1));
        assert!(verifier().verify(&t).is_err());
    }

    #[test]
    fn test_rejects_expired_token() {
        let t = token(&Uuid::new_v4().to_string(), None, Duration::hours(-2));
        assert!(matches!(verifier().verify(&t), Err(CryptoError::Token(_))));
    }

    #[test]
    fn test_rejects_non_uuid_subject() {
        let t = token("alice", None, Duration::hours(1));
        assert!(verifier().verify(&t).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(verifier().verify("invalid.token.here").is_err());
    }

    #[test]
    fn test_rejects_bad_pem() {
        assert!(matches!(
            TokenVerifier::from_rsa_pem("not a key"),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
