//! Credential checks for HTTP requests and socket admission.

use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, FromRequest, HttpRequest};
use crypto_core::jwt::TokenVerifier;
use serde::Deserialize;
use std::future::{ready, Ready};
use uuid::Uuid;

/// Resolves a presented credential to a user id.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Uuid, AppError>;
}

/// RS256 access tokens issued by the marketplace identity service.
pub struct JwtIdentityVerifier {
    tokens: TokenVerifier,
}

impl JwtIdentityVerifier {
    pub fn from_rsa_pem(public_key_pem: &str) -> Result<Self, AppError> {
        let tokens = TokenVerifier::from_rsa_pem(public_key_pem)
            .map_err(|e| AppError::Config(format!("JWT public key: {e}")))?;
        Ok(Self { tokens })
    }
}

impl IdentityVerifier for JwtIdentityVerifier {
    fn verify(&self, credential: &str) -> Result<Uuid, AppError> {
        self.tokens.verify(credential).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AppError::Unauthorized
        })
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// `Authorization: Bearer <token>`, falling back to `?token=` for browser
/// sockets that cannot set headers.
pub fn extract_credential(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    from_header
        .or_else(|| {
            web::Query::<TokenQuery>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.into_inner().token)
        })
        .filter(|token| !token.is_empty())
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let result = match (req.app_data::<web::Data<AppState>>(), extract_credential(req)) {
            (Some(state), Some(credential)) => state
                .verifier
                .verify(&credential)
                .map(|id| User { id }),
            (None, _) => {
                tracing::error!("AppState not registered");
                Err(AppError::Internal)
            }
            (_, None) => Err(AppError::Unauthorized),
        };
        ready(result)
    }
}
