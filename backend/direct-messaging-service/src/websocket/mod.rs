use crate::models::{timestamp_now, PresenceRecord, PresenceStatus};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub mod dispatcher;
pub mod message_types;
pub mod session;
mod typing;

use message_types::ServerEvent;
use typing::TypingFlags;

/// Unique identifier for one live client connection.
///
/// A user with a phone and a laptop open has two transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(Uuid);

impl TransportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Transport {
    id: TransportId,
    sender: UnboundedSender<String>,
}

#[derive(Default)]
struct IdentityEntry {
    // Registration order.
    transports: Vec<Transport>,
    last_seen_at: Option<DateTime<Utc>>,
    changed_at: Option<DateTime<Utc>>,
}

impl IdentityEntry {
    /// Wall clock, nudged forward so transitions of one identity never share
    /// or reverse a timestamp.
    fn next_change_time(&self) -> DateTime<Utc> {
        let now = timestamp_now();
        match self.changed_at {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        }
    }

    fn presence(&self, user_id: Uuid) -> Option<PresenceRecord> {
        let changed_at = self.changed_at?;
        Some(PresenceRecord {
            user_id,
            status: if self.transports.is_empty() {
                PresenceStatus::Offline
            } else {
                PresenceStatus::Online
            },
            last_seen_at: self.last_seen_at,
            changed_at,
        })
    }
}

/// Outcome of closing a transport.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Removal {
    /// Set when this was the identity's last transport.
    pub went_offline: Option<PresenceRecord>,
    /// Parties that were told the identity stopped typing.
    pub stopped_typing_for: Vec<Uuid>,
}

struct Inner {
    identities: DashMap<Uuid, IdentityEntry>,
    typing: TypingFlags,
}

/// Live transports per identity, plus the presence and typing state derived
/// from them.
///
/// Registration and removal for one identity are serialized on its map
/// entry, so the online/offline transition is decided exactly once per edge.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                identities: DashMap::new(),
                typing: TypingFlags::default(),
            }),
        }
    }

    /// Binds a transport to an identity.
    ///
    /// Returns the online transition when this is the identity's first live
    /// transport. Registering an already bound transport changes nothing.
    pub fn register_session(
        &self,
        user_id: Uuid,
        transport_id: TransportId,
        sender: UnboundedSender<String>,
    ) -> Option<PresenceRecord> {
        let mut entry = self.inner.identities.entry(user_id).or_default();
        if entry.transports.iter().any(|t| t.id == transport_id) {
            return None;
        }

        let was_offline = entry.transports.is_empty();
        entry.transports.push(Transport {
            id: transport_id,
            sender,
        });

        tracing::debug!(
            %user_id,
            %transport_id,
            transports = entry.transports.len(),
            "registered transport"
        );

        if !was_offline {
            return None;
        }
        let changed_at = entry.next_change_time();
        entry.changed_at = Some(changed_at);
        entry.presence(user_id)
    }

    /// Unbinds a transport and clears any typing flags it raised.
    ///
    /// Runs synchronously so nothing it owned outlives the connection.
    pub fn remove_session(&self, user_id: Uuid, transport_id: TransportId) -> Removal {
        let went_offline = match self.inner.identities.get_mut(&user_id) {
            Some(mut entry) => {
                let before = entry.transports.len();
                entry.transports.retain(|t| t.id != transport_id);
                let removed = before != entry.transports.len();

                if removed && entry.transports.is_empty() {
                    let now = entry.next_change_time();
                    entry.last_seen_at = Some(now);
                    entry.changed_at = Some(now);
                    entry.presence(user_id)
                } else {
                    None
                }
            }
            None => None,
        };

        // The identity entry guard is released before touching other identities.
        let stopped_typing_for = self.inner.typing.clear_owned_by(user_id, transport_id);
        if !stopped_typing_for.is_empty() {
            let event = ServerEvent::UserStoppedTyping { user_id };
            for to in &stopped_typing_for {
                self.send_to_user(*to, &event, None);
            }
        }

        tracing::debug!(
            %user_id,
            %transport_id,
            offline = went_offline.is_some(),
            cleared_typing = stopped_typing_for.len(),
            "removed transport"
        );

        Removal {
            went_offline,
            stopped_typing_for,
        }
    }

    /// Raises `from`'s typing flag towards `to`, owned by `transport_id`.
    ///
    /// Refused when the transport is no longer registered, so a late event
    /// cannot leave a flag behind a closed connection.
    pub fn set_typing(&self, from: Uuid, to: Uuid, transport_id: TransportId) -> bool {
        let Some(entry) = self.inner.identities.get(&from) else {
            return false;
        };
        if !entry.transports.iter().any(|t| t.id == transport_id) {
            return false;
        }
        // Held across the insert; removal of this transport waits for it.
        self.inner.typing.set(from, to, transport_id);
        drop(entry);
        true
    }

    pub fn clear_typing(&self, from: Uuid, to: Uuid) -> bool {
        self.inner.typing.clear(from, to)
    }

    pub fn is_typing(&self, from: Uuid, to: Uuid) -> bool {
        self.inner.typing.is_typing(from, to)
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner
            .identities
            .get(&user_id)
            .map(|entry| !entry.transports.is_empty())
            .unwrap_or(false)
    }

    /// Live transports of `user_id` in registration order.
    pub fn transports_of(&self, user_id: Uuid) -> Vec<TransportId> {
        self.inner
            .identities
            .get(&user_id)
            .map(|entry| entry.transports.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    /// Presence as seen by this process. `None` for identities never seen here.
    pub fn presence_of(&self, user_id: Uuid) -> Option<PresenceRecord> {
        self.inner
            .identities
            .get(&user_id)
            .and_then(|entry| entry.presence(user_id))
    }

    /// Best-effort delivery to every transport of `user_id` except `except`.
    ///
    /// Returns how many transports accepted the frame.
    pub fn send_to_user(
        &self,
        user_id: Uuid,
        event: &ServerEvent,
        except: Option<TransportId>,
    ) -> usize {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, event = event.event_type(), "failed to encode event");
                return 0;
            }
        };

        let Some(entry) = self.inner.identities.get(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        for transport in entry.transports.iter().filter(|t| Some(t.id) != except) {
            if transport.sender.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(
                    %user_id,
                    transport_id = %transport.id,
                    "dropping frame for closed transport"
                );
            }
        }
        delivered
    }

    pub fn online_count(&self) -> usize {
        self.inner
            .identities
            .iter()
            .filter(|entry| !entry.transports.is_empty())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn connect(
        registry: &ConnectionRegistry,
        user: Uuid,
    ) -> (TransportId, UnboundedReceiver<String>, Option<PresenceRecord>) {
        let (tx, rx) = unbounded_channel();
        let id = TransportId::new();
        let transition = registry.register_session(user, id, tx);
        (id, rx, transition)
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[test]
    fn test_first_and_last_transport_drive_presence() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (t1, _rx1, online) = connect(&registry, user);
        let online = online.expect("first transport goes online");
        assert!(online.is_online());

        let (t2, _rx2, second) = connect(&registry, user);
        assert!(second.is_none());

        assert!(registry.remove_session(user, t1).went_offline.is_none());
        assert!(registry.is_online(user));

        let offline = registry.remove_session(user, t2).went_offline.unwrap();
        assert_eq!(offline.status, PresenceStatus::Offline);
        assert_eq!(offline.last_seen_at, Some(offline.changed_at));
        assert!(offline.changed_at > online.changed_at);
        assert!(!registry.is_online(user));
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let id = TransportId::new();
        let (tx, _rx) = unbounded_channel();

        assert!(registry.register_session(user, id, tx.clone()).is_some());
        assert!(registry.register_session(user, id, tx).is_none());
        assert_eq!(registry.transports_of(user), vec![id]);
    }

    #[test]
    fn test_remove_unknown_transport_is_noop() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (_t, _rx, _) = connect(&registry, user);

        let removal = registry.remove_session(user, TransportId::new());
        assert_eq!(removal, Removal::default());
        assert!(registry.is_online(user));

        let stranger = registry.remove_session(Uuid::new_v4(), TransportId::new());
        assert_eq!(stranger, Removal::default());
    }

    #[test]
    fn test_reconnect_keeps_last_seen_and_advances_time() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (t1, _rx, _) = connect(&registry, user);
        let offline = registry.remove_session(user, t1).went_offline.unwrap();
        let (_t2, _rx2, online) = connect(&registry, user);
        let online = online.unwrap();

        assert_eq!(online.last_seen_at, offline.last_seen_at);
        assert!(online.changed_at > offline.changed_at);
    }

    #[test]
    fn test_fan_out_skips_origin_and_reaches_all_others() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (phone, mut phone_rx, _) = connect(&registry, user);
        let (_laptop, mut laptop_rx, _) = connect(&registry, user);

        let event = ServerEvent::UserTyping {
            user_id: Uuid::new_v4(),
        };
        assert_eq!(registry.send_to_user(user, &event, Some(phone)), 1);
        assert!(drain(&mut phone_rx).is_empty());
        assert_eq!(drain(&mut laptop_rx), vec![event]);
    }

    #[test]
    fn test_send_to_offline_user_is_dropped() {
        let registry = ConnectionRegistry::new();
        let event = ServerEvent::UserTyping {
            user_id: Uuid::new_v4(),
        };
        assert_eq!(registry.send_to_user(Uuid::new_v4(), &event, None), 0);
    }

    #[test]
    fn test_disconnect_clears_typing_and_notifies() {
        let registry = ConnectionRegistry::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice_t, _alice_rx, _) = connect(&registry, alice);
        let (_bob_t, mut bob_rx, _) = connect(&registry, bob);

        assert!(registry.set_typing(alice, bob, alice_t));
        let removal = registry.remove_session(alice, alice_t);

        assert_eq!(removal.stopped_typing_for, vec![bob]);
        assert!(!registry.is_typing(alice, bob));
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::UserStoppedTyping { user_id: alice }]
        );
    }

    #[test]
    fn test_typing_from_closed_transport_is_refused() {
        let registry = ConnectionRegistry::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice_t, _rx, _) = connect(&registry, alice);
        registry.remove_session(alice, alice_t);

        assert!(!registry.set_typing(alice, bob, alice_t));
        assert!(!registry.is_typing(alice, bob));
    }

    #[test]
    fn test_other_device_keeps_its_typing_flag() {
        let registry = ConnectionRegistry::new();
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (phone, _p, _) = connect(&registry, alice);
        let (laptop, _l, _) = connect(&registry, alice);

        registry.set_typing(alice, bob, phone);
        registry.set_typing(alice, carol, laptop);
        registry.remove_session(alice, phone);

        assert!(!registry.is_typing(alice, bob));
        assert!(registry.is_typing(alice, carol));
    }

    #[test]
    fn test_concurrent_connect_disconnect_settles_consistently() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let registry = registry.clone();
                scope.spawn(move || {
                    for _ in 0..200 {
                        let (tx, _rx) = unbounded_channel();
                        let id = TransportId::new();
                        registry.register_session(user, id, tx);
                        registry.remove_session(user, id);
                    }
                });
            }
        });

        assert!(!registry.is_online(user));
        assert_eq!(
            registry.presence_of(user).unwrap().status,
            PresenceStatus::Offline
        );
    }
}
