use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "online" => PresenceStatus::Online,
            _ => PresenceStatus::Offline,
        }
    }
}

/// A presence transition. `changed_at` orders writes: a record never
/// overwrites one with a later `changed_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub changed_at: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn is_online(&self) -> bool {
        self.status == PresenceStatus::Online
    }
}
