//! Room transport message definitions
//! These are the types exchanged between peers through a room

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque peer identifier (actor number within a room)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Well-known replicated metadata keys
pub mod keys {
    /// Match scope: round currently being played
    pub const CURRENT_ROUND: &str = "CurrentRound";
    /// Match scope: seconds left in the current round
    pub const ROUND_TIME: &str = "RoundTime";
    /// Match scope: set whenever some participant is defeated
    pub const IS_DEAD: &str = "IsDead";

    pub const LIVES: &str = "Lives";
    pub const HEALTH: &str = "Health";
    pub const DEFEATED: &str = "Defeated";
    pub const SELECTED_CHARACTER_INDEX: &str = "SelectedCharacterIndex";
    pub const SELECTED_CHARACTER_NICKNAME: &str = "SelectedCharacterNickname";
}

/// Scope a replicated key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "peer", rename_all = "snake_case")]
pub enum Scope {
    /// Match-wide metadata
    Match,
    /// Metadata owned by a single peer
    Peer(PeerId),
}

/// Replicated metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl PropValue {
    /// Numeric view, accepting either numeric representation
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Int(v) => Some(*v as f64),
            PropValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Int(v) => Some(*v),
            PropValue::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// Lamport stamp ordering concurrent writes to the same key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub version: u64,
    pub writer: PeerId,
}

/// A single replicated key write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyWrite {
    pub scope: Scope,
    pub key: String,
    pub value: PropValue,
    pub stamp: Stamp,
}

/// Delivery target of a remote invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "peer", rename_all = "snake_case")]
pub enum RpcTarget {
    /// Every peer in the room, sender included
    All,
    /// Every peer except the sender
    Others,
    /// Every peer, and replayed to peers joining later
    AllBuffered,
    /// A single peer
    Peer(PeerId),
}

/// Weapons that can land a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Punch,
    Projectile,
}

/// Match winner as broadcast to peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub peer: PeerId,
    pub display_name: String,
}

/// What settled the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultTrigger {
    /// All rounds were played
    RoundsExhausted,
    /// Everyone else left the room
    LastPeerStanding,
    /// A participant was defeated in an endgame
    Elimination,
}

/// Settled match outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner: Option<Winner>,
    pub trigger: ResultTrigger,
    pub decided_at: DateTime<Utc>,
}

/// Remote procedure calls understood by peer sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Rpc {
    /// Intermission begins; every peer resets its own avatar
    ShowRoundComplete { completed_round: u32 },

    /// Intermission over; every peer re-enables its own movement
    HideRoundComplete,

    /// Final match outcome
    ShowResult { result: MatchResult },

    /// An attack connected; only the target's owner applies it
    ApplyDamage {
        target: PeerId,
        amount: f32,
        weapon: WeaponKind,
    },
}

/// Sequenced remote invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub sender: PeerId,
    /// Per-sender sequence number, starting at 1
    pub seq: u64,
    pub target: RpcTarget,
    pub call: Rpc,
}

/// Peer identity as seen by other room members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer: PeerId,
    pub display_name: String,
}

/// Events the room pushes to each member
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Another peer joined
    PeerEntered(PeerInfo),

    /// A peer left; `remaining` counts peers still in the room
    PeerLeft { peer: PeerId, remaining: usize },

    /// Accepted metadata writes, in the order the room applied them
    PropertiesChanged(Vec<PropertyWrite>),

    Rpc(RpcEnvelope),
}
