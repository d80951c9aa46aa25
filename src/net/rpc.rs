//! Sequenced sending and duplicate-free receiving of room traffic

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::protocol::{PeerId, PropValue, PropertyWrite, Rpc, RpcEnvelope, RpcTarget, Scope, Stamp};
use super::room::{Room, RoomError};

/// Sending half of a peer's room connection.
///
/// Numbers outgoing invocations per sender and stamps outgoing metadata writes with a
/// Lamport clock. Shared by a session and its orchestrator task.
pub struct Outbox {
    room: Arc<Room>,
    peer: PeerId,
    seq: AtomicU64,
    clock: AtomicU64,
}

impl Outbox {
    pub fn new(room: Arc<Room>, peer: PeerId) -> Self {
        Self {
            room,
            peer,
            seq: AtomicU64::new(0),
            clock: AtomicU64::new(0),
        }
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Send an invocation, returns its sequence number
    pub fn send(&self, target: RpcTarget, call: Rpc) -> Result<u64, RoomError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.room.send_rpc(RpcEnvelope {
            sender: self.peer,
            seq,
            target,
            call,
        })?;
        Ok(seq)
    }

    /// Publish metadata writes under one scope
    pub fn publish<I>(&self, scope: Scope, props: I) -> Result<(), RoomError>
    where
        I: IntoIterator<Item = (&'static str, PropValue)>,
    {
        let writes: Vec<PropertyWrite> = props
            .into_iter()
            .map(|(key, value)| PropertyWrite {
                scope,
                key: key.to_string(),
                value,
                stamp: Stamp {
                    version: self.clock.fetch_add(1, Ordering::SeqCst) + 1,
                    writer: self.peer,
                },
            })
            .collect();

        if writes.is_empty() {
            return Ok(());
        }
        self.room.set_properties(writes)
    }

    /// Merge an observed stamp version into the local clock
    pub fn observe(&self, version: u64) {
        self.clock.fetch_max(version, Ordering::SeqCst);
    }
}

/// Receiving half: drops redelivered invocations.
///
/// Delivery is ordered per sender, so remembering the highest sequence seen from each
/// sender is enough to recognise duplicates.
#[derive(Debug, Default)]
pub struct RpcInbox {
    delivered: HashMap<PeerId, u64>,
}

impl RpcInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time an envelope is seen
    pub fn accept(&mut self, env: &RpcEnvelope) -> bool {
        let last = self.delivered.entry(env.sender).or_insert(0);
        if env.seq <= *last {
            return false;
        }
        *last = env.seq;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{keys, RoomEvent};
    use uuid::Uuid;

    fn envelope(sender: u32, seq: u64) -> RpcEnvelope {
        RpcEnvelope {
            sender: PeerId(sender),
            seq,
            target: RpcTarget::All,
            call: Rpc::HideRoundComplete,
        }
    }

    #[test]
    fn inbox_drops_redelivery() {
        let mut inbox = RpcInbox::new();
        assert!(inbox.accept(&envelope(1, 1)));
        assert!(!inbox.accept(&envelope(1, 1)));
        assert!(inbox.accept(&envelope(2, 1)));
        assert!(inbox.accept(&envelope(1, 2)));
        assert!(!inbox.accept(&envelope(1, 2)));
    }

    #[test]
    fn outbox_numbers_invocations_per_sender() {
        let room = Room::new(Uuid::new_v4());
        let mut member = room.join("Ava").unwrap();
        let outbox = Outbox::new(room.clone(), member.peer);

        assert_eq!(outbox.send(RpcTarget::All, Rpc::HideRoundComplete).unwrap(), 1);
        assert_eq!(outbox.send(RpcTarget::All, Rpc::HideRoundComplete).unwrap(), 2);

        let seqs: Vec<u64> = std::iter::from_fn(|| member.events.try_recv().ok())
            .filter_map(|ev| match ev {
                RoomEvent::Rpc(env) => Some(env.seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn observed_versions_push_the_clock_forward() {
        let room = Room::new(Uuid::new_v4());
        let mut a = room.join("Ava").unwrap();
        let b = room.join("Bo").unwrap();
        let a_out = Outbox::new(room.clone(), a.peer);
        let b_out = Outbox::new(room.clone(), b.peer);

        b_out.observe(10);
        b_out
            .publish(Scope::Match, [(keys::IS_DEAD, PropValue::Bool(true))])
            .unwrap();
        // Without merging b's version, a's first write would lose to it
        a_out.observe(11);
        a_out
            .publish(Scope::Match, [(keys::IS_DEAD, PropValue::Bool(false))])
            .unwrap();

        let last_write = std::iter::from_fn(|| a.events.try_recv().ok())
            .filter_map(|ev| match ev {
                RoomEvent::PropertiesChanged(writes) => writes.into_iter().last(),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last_write.value, PropValue::Bool(false));
        assert_eq!(last_write.stamp.version, 12);
    }
}
