use crate::error::AppError;
use crate::services::uploads::MAX_CHUNK_SIZE;
use crypto_core::DEFAULT_CHUNK_SIZE;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8085;
const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;
const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
const DEFAULT_DB_MAX_CONNECTIONS: usize = 16;
const DEFAULT_UPLOAD_TTL_SECS: u64 = 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub chunk_size: usize,
    pub max_file_size: u64,
    /// Unfinished uploads older than this are discarded.
    pub ttl: Duration,
    /// Chunks and manifests go to disk when set; memory otherwise.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// In-memory stores are used when absent.
    pub database_url: Option<String>,
    pub db_max_connections: usize,
    pub jwt_public_key_pem: String,
    pub max_message_length: usize,
    pub upload: UploadConfig,
    pub websocket: WebSocketConfig,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_public_key_pem = lookup("JWT_PUBLIC_KEY_PEM")
            .map(|pem| pem.replace("\\n", "\n"))
            .filter(|pem| !pem.trim().is_empty())
            .ok_or_else(|| AppError::Config("JWT_PUBLIC_KEY_PEM missing".into()))?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let chunk_size = parse_or(&lookup, "UPLOAD_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(AppError::Config(format!(
                "UPLOAD_CHUNK_SIZE must be between 1 and {MAX_CHUNK_SIZE}"
            )));
        }

        let upload_ttl_secs: u64 = parse_or(&lookup, "UPLOAD_TTL_SECS", DEFAULT_UPLOAD_TTL_SECS)?;
        if upload_ttl_secs == 0 {
            return Err(AppError::Config("UPLOAD_TTL_SECS must be positive".into()));
        }

        let heartbeat_secs: u64 = parse_or(&lookup, "WS_HEARTBEAT_INTERVAL_SECS", 5)?;
        let timeout_secs: u64 = parse_or(&lookup, "WS_CLIENT_TIMEOUT_SECS", 30)?;
        if timeout_secs <= heartbeat_secs {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("plain") | None => LogFormat::Plain,
            Some(other) => {
                return Err(AppError::Config(format!("unknown LOG_FORMAT '{other}'")));
            }
        };

        Ok(Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            jwt_public_key_pem,
            max_message_length: parse_or(&lookup, "MAX_MESSAGE_LENGTH", DEFAULT_MAX_MESSAGE_LENGTH)?,
            upload: UploadConfig {
                chunk_size,
                max_file_size: parse_or(&lookup, "UPLOAD_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
                ttl: Duration::from_secs(upload_ttl_secs),
                dir: lookup("UPLOAD_DIR")
                    .filter(|dir| !dir.trim().is_empty())
                    .map(PathBuf::from),
            },
            websocket: WebSocketConfig {
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
                client_timeout: Duration::from_secs(timeout_secs),
            },
            log_format,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("invalid {key}: '{raw}'"))),
        None => Ok(default),
    }
}
