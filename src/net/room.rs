//! Room hub: membership, metadata relay and invocation routing

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::rate_limit::DamageGuard;
use crate::util::time::format_clock;

use super::protocol::{
    keys, MatchResult, PeerId, PeerInfo, PropertyWrite, Rpc, RpcEnvelope, RpcTarget, RoomEvent,
    Scope,
};
use super::store::ReplicatedStore;

/// Room transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is closed")]
    Closed,

    #[error("Peer {0} is not a member of this room")]
    UnknownPeer(PeerId),

    #[error("Peer {0} exceeded the damage rate limit")]
    RateLimited(PeerId),
}

/// Connection of one member
struct PeerLink {
    info: PeerInfo,
    tx: mpsc::UnboundedSender<RoomEvent>,
    damage_guard: DamageGuard,
}

impl PeerLink {
    fn push(&self, event: RoomEvent) {
        if self.tx.send(event).is_err() {
            debug!(peer = %self.info.peer, "Event channel closed");
        }
    }
}

struct RoomInner {
    peers: BTreeMap<PeerId, PeerLink>,
    coordinator: Option<PeerId>,
    next_actor: u32,
    store: ReplicatedStore,
    buffered: Vec<RpcEnvelope>,
    last_result: Option<MatchResult>,
    closed: bool,
    emptied_at: Option<DateTime<Utc>>,
}

/// What a peer receives when it joins
#[derive(Debug)]
pub struct Membership {
    pub peer: PeerId,
    /// Fixed for the room's lifetime
    pub coordinator: PeerId,
    /// Peers already present, self included
    pub roster: Vec<PeerInfo>,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
}

/// In-process room shared by every peer of one match.
///
/// Holds the server copy of the replicated metadata. Each member gets one ordered event
/// channel, so everything a sender submits reaches every receiver in submission order.
/// The first peer to join becomes the coordinator and stays coordinator: there is no
/// migration when it leaves.
pub struct Room {
    id: Uuid,
    created_at: DateTime<Utc>,
    damage_limit: u32,
    inner: Mutex<RoomInner>,
}

impl Room {
    /// Room without a cap on damage invocations
    pub fn new(id: Uuid) -> Arc<Self> {
        Self::with_damage_limit(id, 0)
    }

    /// Room that caps each member at `per_second` damage invocations, 0 for no cap
    pub fn with_damage_limit(id: Uuid, per_second: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            created_at: Utc::now(),
            damage_limit: per_second,
            inner: Mutex::new(RoomInner {
                peers: BTreeMap::new(),
                coordinator: None,
                next_actor: 1,
                store: ReplicatedStore::new(),
                buffered: Vec::new(),
                last_result: None,
                closed: false,
                emptied_at: None,
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join the room, returns the new member's identity and event stream
    pub fn join(&self, display_name: &str) -> Result<Membership, RoomError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(RoomError::Closed);
        }

        let peer = PeerId(inner.next_actor);
        inner.next_actor += 1;
        let coordinator = *inner.coordinator.get_or_insert(peer);

        let info = PeerInfo {
            peer,
            display_name: display_name.to_string(),
        };
        let (tx, events) = mpsc::unbounded_channel();
        let link = PeerLink {
            info: info.clone(),
            tx,
            damage_guard: DamageGuard::new(self.damage_limit),
        };

        // Catch the new replica up before anything else reaches it
        let snapshot = inner.store.snapshot();
        if !snapshot.is_empty() {
            link.push(RoomEvent::PropertiesChanged(snapshot));
        }
        for env in &inner.buffered {
            link.push(RoomEvent::Rpc(env.clone()));
        }

        for other in inner.peers.values() {
            other.push(RoomEvent::PeerEntered(info.clone()));
        }

        inner.peers.insert(peer, link);
        let roster = inner.peers.values().map(|l| l.info.clone()).collect();

        info!(
            room_id = %self.id,
            peer = %peer,
            display_name = %display_name,
            coordinator = %coordinator,
            population = inner.peers.len(),
            "Peer joined room"
        );

        Ok(Membership {
            peer,
            coordinator,
            roster,
            events,
        })
    }

    /// Remove a member, returns false if it was not present
    pub fn leave(&self, peer: PeerId) -> bool {
        let mut inner = self.inner.lock();
        if inner.peers.remove(&peer).is_none() {
            return false;
        }

        inner.store.remove_peer(peer);
        let remaining = inner.peers.len();
        for link in inner.peers.values() {
            link.push(RoomEvent::PeerLeft { peer, remaining });
        }

        info!(room_id = %self.id, peer = %peer, remaining, "Peer left room");

        if inner.coordinator == Some(peer) && remaining > 0 && inner.last_result.is_none() {
            warn!(
                room_id = %self.id,
                peer = %peer,
                "Coordinator left mid-match, round sequencing halts"
            );
        }

        if remaining == 0 {
            inner.closed = true;
            inner.emptied_at = Some(Utc::now());
        }

        true
    }

    /// Apply metadata writes and relay the accepted ones to every member
    pub fn set_properties(&self, writes: Vec<PropertyWrite>) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(RoomError::Closed);
        }

        let mut accepted = Vec::with_capacity(writes.len());
        for write in writes {
            let writer = write.stamp.writer;
            if !inner.peers.contains_key(&writer) {
                return Err(RoomError::UnknownPeer(writer));
            }
            if let Scope::Peer(owner) = write.scope {
                if owner != writer {
                    debug!(
                        room_id = %self.id,
                        writer = %writer,
                        owner = %owner,
                        key = %write.key,
                        "Ignoring write to metadata owned by another peer"
                    );
                    continue;
                }
            }
            if inner.store.apply(&write) {
                accepted.push(write);
            }
        }

        if !accepted.is_empty() {
            for link in inner.peers.values() {
                link.push(RoomEvent::PropertiesChanged(accepted.clone()));
            }
        }

        Ok(())
    }

    /// Route a remote invocation to its target(s)
    pub fn send_rpc(&self, env: RpcEnvelope) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(RoomError::Closed);
        }

        let sender = inner
            .peers
            .get(&env.sender)
            .ok_or(RoomError::UnknownPeer(env.sender))?;

        if matches!(env.call, Rpc::ApplyDamage { .. }) && !sender.damage_guard.allows() {
            warn!(room_id = %self.id, peer = %env.sender, "Rate limited damage invocation");
            return Err(RoomError::RateLimited(env.sender));
        }

        if let Rpc::ShowResult { result } = &env.call {
            inner.last_result = Some(result.clone());
        }

        match env.target {
            RpcTarget::All | RpcTarget::AllBuffered => {
                for link in inner.peers.values() {
                    link.push(RoomEvent::Rpc(env.clone()));
                }
            }
            RpcTarget::Others => {
                for link in inner.peers.values().filter(|l| l.info.peer != env.sender) {
                    link.push(RoomEvent::Rpc(env.clone()));
                }
            }
            RpcTarget::Peer(target) => match inner.peers.get(&target) {
                Some(link) => link.push(RoomEvent::Rpc(env.clone())),
                None => debug!(room_id = %self.id, target = %target, "Invocation target not in room"),
            },
        }

        if env.target == RpcTarget::AllBuffered {
            inner.buffered.push(env);
        }

        Ok(())
    }

    pub fn population(&self) -> usize {
        self.inner.lock().peers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// When the last member left, if the room is empty
    pub fn emptied_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().emptied_at
    }

    /// Read model of the server copy for the status surface
    pub fn status(&self) -> RoomStatus {
        let inner = self.inner.lock();
        let store = &inner.store;

        let current_round = store.get_i64(Scope::Match, keys::CURRENT_ROUND);
        let round_time = store.get_f64(Scope::Match, keys::ROUND_TIME);
        let clock = match (current_round, round_time) {
            (Some(round), Some(t)) => Some(format!("Round {}: {}", round, format_clock(t as f32))),
            _ => None,
        };

        let players = inner
            .peers
            .values()
            .map(|link| {
                let scope = Scope::Peer(link.info.peer);
                PlayerStatus {
                    peer: link.info.peer,
                    display_name: link.info.display_name.clone(),
                    lives: store.get_i64(scope, keys::LIVES),
                    health: store.get_f64(scope, keys::HEALTH),
                    defeated: store.get_bool(scope, keys::DEFEATED).unwrap_or(false),
                }
            })
            .collect();

        RoomStatus {
            room_id: self.id,
            created_at: self.created_at,
            coordinator: inner.coordinator,
            population: inner.peers.len(),
            closed: inner.closed,
            current_round,
            round_time,
            clock,
            players,
            result: inner.last_result.clone(),
        }
    }
}

/// Per-player line of a room status
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub peer: PeerId,
    pub display_name: String,
    pub lives: Option<i64>,
    pub health: Option<f64>,
    pub defeated: bool,
}

/// Room read model
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub coordinator: Option<PeerId>,
    pub population: usize,
    pub closed: bool,
    pub current_round: Option<i64>,
    pub round_time: Option<f64>,
    pub clock: Option<String>,
    pub players: Vec<PlayerStatus>,
    pub result: Option<MatchResult>,
}

/// Registry of all active rooms
pub struct RoomRegistry {
    rooms: DashMap<Uuid, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Room>> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn insert(&self, room: Arc<Room>) {
        self.rooms.insert(room.id(), room);
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.iter().filter(|r| !r.value().is_closed()).count()
    }

    pub fn total_peers(&self) -> usize {
        self.rooms.iter().map(|r| r.value().population()).sum()
    }

    pub fn statuses(&self) -> Vec<RoomStatus> {
        let mut statuses: Vec<RoomStatus> = self.rooms.iter().map(|r| r.value().status()).collect();
        statuses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        statuses
    }

    /// Drop rooms that have been empty for longer than `linger`
    pub fn prune_closed(&self, linger: chrono::Duration) -> usize {
        let now = Utc::now();
        let before = self.rooms.len();
        self.rooms.retain(|_, room| match room.emptied_at() {
            Some(at) => now - at < linger,
            None => true,
        });
        before - self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{PropValue, Stamp, WeaponKind};

    fn drain(events: &mut mpsc::UnboundedReceiver<RoomEvent>) -> Vec<RoomEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = events.try_recv() {
            out.push(ev);
        }
        out
    }

    fn envelope(sender: PeerId, seq: u64, target: RpcTarget, call: Rpc) -> RpcEnvelope {
        RpcEnvelope {
            sender,
            seq,
            target,
            call,
        }
    }

    #[test]
    fn first_member_is_coordinator_for_good() {
        let room = Room::new(Uuid::new_v4());
        let a = room.join("Ava").unwrap();
        let b = room.join("Bo").unwrap();
        assert_eq!(a.coordinator, a.peer);
        assert_eq!(b.coordinator, a.peer);
        assert_eq!(b.roster.len(), 2);

        room.leave(a.peer);
        let c = room.join("Cy").unwrap();
        assert_eq!(c.coordinator, a.peer);
        assert_eq!(room.status().coordinator, Some(a.peer));
    }

    #[test]
    fn leave_reports_remaining_population() {
        let room = Room::new(Uuid::new_v4());
        let mut a = room.join("Ava").unwrap();
        let b = room.join("Bo").unwrap();
        drain(&mut a.events);

        assert!(room.leave(b.peer));
        assert!(!room.leave(b.peer));

        let events = drain(&mut a.events);
        assert_eq!(
            events,
            vec![RoomEvent::PeerLeft {
                peer: b.peer,
                remaining: 1
            }]
        );
    }

    #[test]
    fn others_target_skips_sender() {
        let room = Room::new(Uuid::new_v4());
        let mut a = room.join("Ava").unwrap();
        let mut b = room.join("Bo").unwrap();
        drain(&mut a.events);
        drain(&mut b.events);

        room.send_rpc(envelope(a.peer, 1, RpcTarget::Others, Rpc::HideRoundComplete))
            .unwrap();

        assert!(drain(&mut a.events).is_empty());
        assert_eq!(drain(&mut b.events).len(), 1);
    }

    #[test]
    fn late_joiner_receives_buffered_calls_and_metadata() {
        let room = Room::new(Uuid::new_v4());
        let a = room.join("Ava").unwrap();

        room.set_properties(vec![PropertyWrite {
            scope: Scope::Match,
            key: keys::CURRENT_ROUND.to_string(),
            value: PropValue::Int(2),
            stamp: Stamp {
                version: 1,
                writer: a.peer,
            },
        }])
        .unwrap();
        room.send_rpc(envelope(a.peer, 1, RpcTarget::AllBuffered, Rpc::HideRoundComplete))
            .unwrap();
        room.send_rpc(envelope(a.peer, 2, RpcTarget::All, Rpc::HideRoundComplete))
            .unwrap();

        let mut late = room.join("Late").unwrap();
        let events = drain(&mut late.events);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RoomEvent::PropertiesChanged(w) if w.len() == 1));
        assert!(matches!(&events[1], RoomEvent::Rpc(env) if env.seq == 1));
    }

    #[test]
    fn writes_to_another_peers_scope_are_dropped() {
        let room = Room::new(Uuid::new_v4());
        let a = room.join("Ava").unwrap();
        let mut b = room.join("Bo").unwrap();
        drain(&mut b.events);

        room.set_properties(vec![PropertyWrite {
            scope: Scope::Peer(b.peer),
            key: keys::LIVES.to_string(),
            value: PropValue::Int(0),
            stamp: Stamp {
                version: 1,
                writer: a.peer,
            },
        }])
        .unwrap();

        assert!(drain(&mut b.events).is_empty());
        assert_eq!(room.status().players[1].lives, None);
    }

    #[test]
    fn non_members_cannot_send() {
        let room = Room::new(Uuid::new_v4());
        let _a = room.join("Ava").unwrap();
        let err = room
            .send_rpc(envelope(PeerId(42), 1, RpcTarget::All, Rpc::HideRoundComplete))
            .unwrap_err();
        assert_eq!(err, RoomError::UnknownPeer(PeerId(42)));
    }

    fn damage_flood(room: &Room) -> Vec<Result<(), RoomError>> {
        let a = room.join("Ava").unwrap();
        let b = room.join("Bo").unwrap();
        (1..=40)
            .map(|seq| {
                room.send_rpc(envelope(
                    a.peer,
                    seq,
                    RpcTarget::All,
                    Rpc::ApplyDamage {
                        target: b.peer,
                        amount: 1.0,
                        weapon: WeaponKind::Punch,
                    },
                ))
            })
            .collect()
    }

    #[test]
    fn damage_flood_is_rate_limited_when_capped() {
        let room = Room::with_damage_limit(Uuid::new_v4(), 10);
        let results = damage_flood(&room);

        assert!(results.iter().any(|r| r.is_ok()));
        assert!(results.contains(&Err(RoomError::RateLimited(PeerId(1)))));
    }

    #[test]
    fn uncapped_room_delivers_every_hit() {
        let room = Room::new(Uuid::new_v4());
        let results = damage_flood(&room);

        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn empty_room_closes() {
        let registry = RoomRegistry::new();
        let room = Room::new(Uuid::new_v4());
        registry.insert(room.clone());
        let a = room.join("Ava").unwrap();
        assert_eq!(registry.active_rooms(), 1);

        room.leave(a.peer);
        assert!(room.is_closed());
        assert_eq!(room.join("Bo").unwrap_err(), RoomError::Closed);
        assert_eq!(registry.active_rooms(), 0);
        assert_eq!(registry.prune_closed(chrono::Duration::zero()), 1);
    }
}
