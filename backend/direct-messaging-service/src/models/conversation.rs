use super::message::{Message, MessageView};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub counterpart_id: Uuid,
    pub last_message: MessageView,
    pub unread_count: u64,
}

/// Groups `user_id`'s non-deleted messages by counterpart.
///
/// The preview is the latest message of each group; unread counts only
/// messages addressed to `user_id`. Most recent conversation first.
pub fn summarize(user_id: Uuid, messages: impl IntoIterator<Item = Message>) -> Vec<ConversationSummary> {
    let mut groups: HashMap<Uuid, (Message, u64)> = HashMap::new();

    for message in messages {
        if message.is_deleted() {
            continue;
        }
        let Some(counterpart) = message.counterpart_of(user_id) else {
            continue;
        };
        let unread = u64::from(message.receiver_id == user_id && message.read_at.is_none());

        match groups.get_mut(&counterpart) {
            Some((latest, count)) => {
                *count += unread;
                if (message.created_at, message.id) > (latest.created_at, latest.id) {
                    *latest = message;
                }
            }
            None => {
                groups.insert(counterpart, (message, unread));
            }
        }
    }

    let mut summaries: Vec<ConversationSummary> = groups
        .into_iter()
        .map(|(counterpart_id, (latest, unread_count))| ConversationSummary {
            counterpart_id,
            last_message: latest.view(),
            unread_count,
        })
        .collect();

    summaries.sort_by(|a, b| {
        (b.last_message.created_at, b.last_message.id)
            .cmp(&(a.last_message.created_at, a.last_message.id))
    });
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn msg(from: Uuid, to: Uuid, minutes_ago: i64) -> Message {
        Message::new(
            from,
            to,
            format!("m{minutes_ago}"),
            None,
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn test_groups_by_counterpart_with_latest_preview() {
        let (me, seller, buyer) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            msg(me, seller, 30),
            msg(seller, me, 20),
            msg(buyer, me, 10),
            msg(seller, me, 5),
        ];

        let summaries = summarize(me, messages);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].counterpart_id, seller);
        assert_eq!(summaries[0].last_message.content.as_deref(), Some("m5"));
        assert_eq!(summaries[0].unread_count, 2);
        assert_eq!(summaries[1].counterpart_id, buyer);
        assert_eq!(summaries[1].unread_count, 1);
    }

    #[test]
    fn test_own_and_read_messages_are_not_unread() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut read = msg(other, me, 3);
        read.read_at = Some(Utc::now());

        let summaries = summarize(me, vec![msg(me, other, 5), read]);
        assert_eq!(summaries[0].unread_count, 0);
    }

    #[test]
    fn test_deleted_messages_are_excluded() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let kept = msg(other, me, 10);
        let mut deleted = msg(other, me, 1);
        deleted.deleted_at = Some(Utc::now());

        let summaries = summarize(me, vec![kept.clone(), deleted]);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].last_message.id, kept.id);
        assert_eq!(summaries[0].unread_count, 1);
    }

    #[test]
    fn test_conversation_with_only_deleted_messages_disappears() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut deleted = msg(me, other, 1);
        deleted.deleted_at = Some(Utc::now());
        assert!(summarize(me, vec![deleted]).is_empty());
    }
}
