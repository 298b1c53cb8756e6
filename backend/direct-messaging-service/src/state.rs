use crate::config::Config;
use crate::db;
use crate::error::AppResult;
use crate::middleware::IdentityVerifier;
use crate::services::{ChunkedUploadManager, KeyDirectory, MessageLifecycleManager, PresenceTracker};
use crate::store::{
    DiskUploadStore, MemoryMessageStore, MemoryPresenceStore, MemoryUploadStore,
    MemoryUserDirectory, MessageStore, PgMessageStore, PgPresenceStore, PgUserDirectory,
    PresenceStore, UploadStore, UserDirectory,
};
use crate::websocket::dispatcher::EventDispatcher;
use crate::websocket::ConnectionRegistry;
use std::sync::Arc;

/// Storage backends behind the service.
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub presence: Arc<dyn PresenceStore>,
    pub uploads: Arc<dyn UploadStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    /// Everything in process memory. Users become known once they authenticate.
    pub fn in_memory() -> Self {
        Self {
            messages: Arc::new(MemoryMessageStore::new()),
            presence: Arc::new(MemoryPresenceStore::new()),
            uploads: Arc::new(MemoryUploadStore::new()),
            users: Arc::new(MemoryUserDirectory::learning()),
        }
    }

    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let mut stores = match &config.database_url {
            Some(url) => {
                let pool = db::init_pool(url, config.db_max_connections).await?;
                tracing::info!("using PostgreSQL message and presence stores");
                Self {
                    messages: Arc::new(PgMessageStore::new(pool.clone())),
                    presence: Arc::new(PgPresenceStore::new(pool.clone())),
                    uploads: Arc::new(MemoryUploadStore::new()),
                    users: Arc::new(PgUserDirectory::new(pool)),
                }
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores");
                Self::in_memory()
            }
        };

        if let Some(dir) = &config.upload.dir {
            stores.uploads = Arc::new(DiskUploadStore::open(dir).await?);
            tracing::info!(dir = %dir.display(), "storing upload chunks on disk");
        }
        Ok(stores)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub presence: PresenceTracker,
    pub lifecycle: Arc<MessageLifecycleManager>,
    pub dispatcher: Arc<EventDispatcher>,
    pub keys: Arc<KeyDirectory>,
    pub uploads: Arc<ChunkedUploadManager>,
    pub users: Arc<dyn UserDirectory>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub fn new(config: Arc<Config>, stores: Stores, verifier: Arc<dyn IdentityVerifier>) -> Self {
        let registry = ConnectionRegistry::new();
        let presence = PresenceTracker::new(registry.clone(), stores.presence);
        let lifecycle = Arc::new(MessageLifecycleManager::new(
            stores.messages,
            stores.users.clone(),
            registry.clone(),
            config.max_message_length,
        ));
        let dispatcher = Arc::new(EventDispatcher::new(lifecycle.clone()));
        let uploads = Arc::new(ChunkedUploadManager::new(
            stores.uploads,
            config.upload.chunk_size,
            config.upload.max_file_size,
        ));

        Self {
            config,
            registry,
            presence,
            lifecycle,
            dispatcher,
            keys: Arc::new(KeyDirectory::new()),
            uploads,
            users: stores.users,
            verifier,
        }
    }
}
