use crate::error::AppResult;
use crate::models::{timestamp_now, PresenceRecord, PresenceStatus};
use crate::store::PresenceStore;
use crate::websocket::{ConnectionRegistry, Removal, TransportId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Connects transport lifecycle to the durable presence record.
///
/// The registry decides transitions synchronously; persisting them is
/// asynchronous and ordered by `changed_at`, so a late write can never
/// overwrite a newer status.
#[derive(Clone)]
pub struct PresenceTracker {
    registry: ConnectionRegistry,
    store: Arc<dyn PresenceStore>,
}

impl PresenceTracker {
    pub fn new(registry: ConnectionRegistry, store: Arc<dyn PresenceStore>) -> Self {
        Self { registry, store }
    }

    /// Registers the transport; returns the online transition to persist, if any.
    pub fn attach(
        &self,
        user_id: Uuid,
        transport_id: TransportId,
        sender: UnboundedSender<String>,
    ) -> Option<PresenceRecord> {
        self.registry.register_session(user_id, transport_id, sender)
    }

    /// Removes the transport; the offline transition (if any) is in the result.
    pub fn detach(&self, user_id: Uuid, transport_id: TransportId) -> Removal {
        self.registry.remove_session(user_id, transport_id)
    }

    pub async fn connect(
        &self,
        user_id: Uuid,
        transport_id: TransportId,
        sender: UnboundedSender<String>,
    ) {
        if let Some(record) = self.attach(user_id, transport_id, sender) {
            self.persist(&record).await;
        }
    }

    pub async fn disconnect(&self, user_id: Uuid, transport_id: TransportId) -> Removal {
        let removal = self.detach(user_id, transport_id);
        if let Some(record) = &removal.went_offline {
            self.persist(record).await;
        }
        removal
    }

    /// Storage failures are logged and dropped; the in-memory registry stays
    /// authoritative for this process.
    pub async fn persist(&self, record: &PresenceRecord) {
        match self.store.record(record).await {
            Ok(true) => {
                tracing::debug!(user_id = %record.user_id, status = record.status.as_str(), "presence persisted")
            }
            Ok(false) => tracing::debug!(
                user_id = %record.user_id,
                status = record.status.as_str(),
                "presence write superseded by a newer transition"
            ),
            Err(e) => tracing::warn!(
                user_id = %record.user_id,
                error = %e,
                "failed to persist presence"
            ),
        }
    }

    /// Local view first, then the durable record, then "offline, never seen".
    pub async fn presence(&self, user_id: Uuid) -> AppResult<PresenceRecord> {
        if let Some(record) = self.registry.presence_of(user_id) {
            return Ok(record);
        }
        if let Some(record) = self.store.get(user_id).await? {
            return Ok(record);
        }
        Ok(PresenceRecord {
            user_id,
            status: PresenceStatus::Offline,
            last_seen_at: None,
            changed_at: timestamp_now(),
        })
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}
