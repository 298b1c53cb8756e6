use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use crypto_core::CryptoError;
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    /// Malformed or empty input. Nothing was changed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Acting on another party's message or upload.
    #[error("not permitted")]
    Forbidden,

    #[error("not found")]
    NotFound,

    /// A concurrent or earlier transition already moved the record on.
    #[error("stale state: {0}")]
    StaleState(String),

    #[error("upload incomplete: {} chunk(s) missing", missing.len())]
    IncompleteUpload { missing: Vec<u32> },

    #[error("decryption failed")]
    Decryption,

    #[error("database error: {0}")]
    Database(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal server error")]
    Internal,
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Storage(format!("corrupt record: {e}"))
    }
}

impl From<CryptoError> for AppError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Decryption => AppError::Decryption,
            CryptoError::IncompleteTransfer { missing } => AppError::IncompleteUpload { missing },
            CryptoError::InvalidKey(msg)
            | CryptoError::KeyAgreement(msg)
            | CryptoError::InvalidChunk(msg) => AppError::Validation(msg),
            CryptoError::MissingSessionKey(partner) => {
                AppError::Validation(format!("no session key for {partner}"))
            }
            CryptoError::Token(_) => AppError::Unauthorized,
            CryptoError::Encryption => AppError::Internal,
        }
    }
}

impl AppError {
    /// Stable machine-readable code used in HTTP bodies and `message_error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized => "authentication_failed",
            AppError::Forbidden => "authorization_error",
            AppError::NotFound => "not_found",
            AppError::StaleState(_) => "stale_state",
            AppError::IncompleteUpload { .. } => "upload_incomplete",
            AppError::Decryption => "decryption_error",
            AppError::Database(_) | AppError::Storage(_) => "storage_error",
            AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
                "internal_error"
            }
        }
    }

    /// Detail safe to show the acting client. Storage internals stay in the logs.
    pub fn public_details(&self) -> Option<String> {
        match self {
            AppError::Validation(msg) | AppError::StaleState(msg) => Some(msg.clone()),
            AppError::IncompleteUpload { missing } => Some(format!("missing chunks: {missing:?}")),
            _ => None,
        }
    }

    /// Returns whether this error is retryable (e.g., database connection timeout)
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(msg) => {
                msg.contains("Timeout") || msg.contains("Closed") || msg.contains("Io")
            }
            AppError::Internal => true,
            _ => false,
        }
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden => 403,
            AppError::NotFound => 404,
            AppError::StaleState(_) | AppError::IncompleteUpload { .. } => 409,
            AppError::Decryption => 422,
            AppError::Database(_) | AppError::Storage(_) => 503,
            _ => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(
            self,
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal
        ) {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(ResponseError::status_code(self)).json(ErrorBody {
            error: self.code(),
            details: self.public_details(),
        })
    }
}
