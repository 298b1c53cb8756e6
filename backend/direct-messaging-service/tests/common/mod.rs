#![allow(dead_code)]

use crypto_core::jwt::Claims;
use direct_messaging_service::config::Config;
use direct_messaging_service::middleware::JwtIdentityVerifier;
use direct_messaging_service::state::{AppState, Stores};
use direct_messaging_service::store::{
    MemoryMessageStore, MemoryPresenceStore, MemoryUploadStore, MemoryUserDirectory,
};
use direct_messaging_service::websocket::message_types::ServerEvent;
use direct_messaging_service::websocket::TransportId;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

pub const PRIVATE_KEY_PEM: &str = include_str!("../../../libs/crypto-core/testdata/jwt_test_private.pem");
pub const PUBLIC_KEY_PEM: &str = include_str!("../../../libs/crypto-core/testdata/jwt_test_public.pem");

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "JWT_PUBLIC_KEY_PEM" => Some(PUBLIC_KEY_PEM.to_string()),
        "UPLOAD_CHUNK_SIZE" => Some("1024".to_string()),
        "MAX_MESSAGE_LENGTH" => Some("8000".to_string()),
        _ => None,
    })
    .expect("test config")
}

pub struct TestApp {
    pub state: AppState,
    pub messages: Arc<MemoryMessageStore>,
    pub presence: Arc<MemoryPresenceStore>,
}

/// Service state over in-memory stores where exactly `users` exist.
pub fn test_app(users: &[Uuid]) -> TestApp {
    let messages = Arc::new(MemoryMessageStore::new());
    let presence = Arc::new(MemoryPresenceStore::new());
    let stores = Stores {
        messages: messages.clone(),
        presence: presence.clone(),
        uploads: Arc::new(MemoryUploadStore::new()),
        users: Arc::new(MemoryUserDirectory::with_users(users.iter().copied())),
    };
    let verifier = Arc::new(JwtIdentityVerifier::from_rsa_pem(PUBLIC_KEY_PEM).expect("verifier"));
    TestApp {
        state: AppState::new(Arc::new(test_config()), stores, verifier),
        messages,
        presence,
    }
}

pub fn token_for(user_id: Uuid) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 3600,
        token_type: Some("access".to_string()),
    };
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY_PEM.as_bytes()).expect("private key");
    encode(&Header::new(Algorithm::RS256), &claims, &key).expect("sign token")
}

/// A connected client as the registry sees it.
pub struct FakeTransport {
    pub user_id: Uuid,
    pub id: TransportId,
    rx: UnboundedReceiver<String>,
}

impl FakeTransport {
    pub fn connect(state: &AppState, user_id: Uuid) -> Self {
        let (tx, rx) = unbounded_channel();
        let id = TransportId::new();
        state.presence.attach(user_id, id, tx);
        Self { user_id, id, rx }
    }

    pub fn disconnect(&self, state: &AppState) {
        state.presence.detach(self.user_id, self.id);
    }

    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            events.push(serde_json::from_str(&frame).expect("server frame is valid JSON"));
        }
        events
    }
}
