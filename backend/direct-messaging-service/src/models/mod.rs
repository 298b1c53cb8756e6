pub mod conversation;
pub mod message;
pub mod presence;

pub use conversation::{summarize, ConversationSummary};
pub use message::{Message, MessageView};
pub use presence::{PresenceRecord, PresenceStatus};

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to microseconds, the resolution of `TIMESTAMPTZ`.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
