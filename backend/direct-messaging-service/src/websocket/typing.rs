use super::TransportId;
use dashmap::DashMap;
use uuid::Uuid;

/// `(from, to) -> transport that raised the flag`.
#[derive(Default)]
pub(crate) struct TypingFlags {
    flags: DashMap<(Uuid, Uuid), TransportId>,
}

impl TypingFlags {
    /// Returns true when the flag was not already raised.
    pub(crate) fn set(&self, from: Uuid, to: Uuid, transport: TransportId) -> bool {
        self.flags.insert((from, to), transport).is_none()
    }

    pub(crate) fn clear(&self, from: Uuid, to: Uuid) -> bool {
        self.flags.remove(&(from, to)).is_some()
    }

    /// Drops every flag `from` raised through `transport`; returns the `to` side of each.
    pub(crate) fn clear_owned_by(&self, from: Uuid, transport: TransportId) -> Vec<Uuid> {
        let mut cleared = Vec::new();
        self.flags.retain(|(flag_from, to), owner| {
            if *flag_from == from && *owner == transport {
                cleared.push(*to);
                false
            } else {
                true
            }
        });
        cleared
    }

    pub(crate) fn is_typing(&self, from: Uuid, to: Uuid) -> bool {
        self.flags.contains_key(&(from, to))
    }
}
