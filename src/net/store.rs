//! Replicated key/value metadata with per-key last-writer-wins

use std::collections::HashMap;

use super::protocol::{PeerId, PropValue, PropertyWrite, Scope, Stamp};

#[derive(Debug, Clone)]
struct Entry {
    value: PropValue,
    stamp: Stamp,
}

/// One replica of the room metadata.
///
/// The room keeps the server copy and every peer session keeps its own. Writes carry a
/// Lamport stamp, and a write replaces the stored entry only if its stamp is newer, so
/// replicas converge regardless of the order they observe writes in.
#[derive(Debug, Default, Clone)]
pub struct ReplicatedStore {
    entries: HashMap<(Scope, String), Entry>,
}

impl ReplicatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a write, returns true if it replaced the current value
    pub fn apply(&mut self, write: &PropertyWrite) -> bool {
        let slot = (write.scope, write.key.clone());
        match self.entries.get(&slot) {
            Some(current) if current.stamp >= write.stamp => false,
            _ => {
                self.entries.insert(
                    slot,
                    Entry {
                        value: write.value.clone(),
                        stamp: write.stamp,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, scope: Scope, key: &str) -> Option<&PropValue> {
        self.entries
            .get(&(scope, key.to_string()))
            .map(|entry| &entry.value)
    }

    pub fn get_f64(&self, scope: Scope, key: &str) -> Option<f64> {
        self.get(scope, key).and_then(PropValue::as_f64)
    }

    pub fn get_i64(&self, scope: Scope, key: &str) -> Option<i64> {
        self.get(scope, key).and_then(PropValue::as_i64)
    }

    pub fn get_bool(&self, scope: Scope, key: &str) -> Option<bool> {
        self.get(scope, key).and_then(PropValue::as_bool)
    }

    /// Drop all metadata owned by a peer (on leave)
    pub fn remove_peer(&mut self, peer: PeerId) {
        self.entries.retain(|(scope, _), _| *scope != Scope::Peer(peer));
    }

    /// Every entry as a write, used to bring a new replica up to date
    pub fn snapshot(&self) -> Vec<PropertyWrite> {
        let mut writes: Vec<PropertyWrite> = self
            .entries
            .iter()
            .map(|((scope, key), entry)| PropertyWrite {
                scope: *scope,
                key: key.clone(),
                value: entry.value.clone(),
                stamp: entry.stamp,
            })
            .collect();
        writes.sort_by(|a, b| a.stamp.cmp(&b.stamp));
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::keys;

    fn write(scope: Scope, key: &str, value: PropValue, version: u64, writer: u32) -> PropertyWrite {
        PropertyWrite {
            scope,
            key: key.to_string(),
            value,
            stamp: Stamp {
                version,
                writer: PeerId(writer),
            },
        }
    }

    #[test]
    fn newer_write_wins() {
        let mut store = ReplicatedStore::new();
        assert!(store.apply(&write(Scope::Match, keys::ROUND_TIME, PropValue::Float(240.0), 1, 1)));
        assert!(store.apply(&write(Scope::Match, keys::ROUND_TIME, PropValue::Float(239.0), 2, 1)));
        assert_eq!(store.get_f64(Scope::Match, keys::ROUND_TIME), Some(239.0));
    }

    #[test]
    fn stale_write_is_rejected() {
        let mut store = ReplicatedStore::new();
        store.apply(&write(Scope::Match, keys::ROUND_TIME, PropValue::Float(100.0), 5, 1));
        assert!(!store.apply(&write(Scope::Match, keys::ROUND_TIME, PropValue::Float(200.0), 3, 1)));
        assert!(!store.apply(&write(Scope::Match, keys::ROUND_TIME, PropValue::Float(200.0), 5, 1)));
        assert_eq!(store.get_f64(Scope::Match, keys::ROUND_TIME), Some(100.0));
    }

    #[test]
    fn concurrent_writes_converge_in_any_order() {
        let a = write(Scope::Match, keys::IS_DEAD, PropValue::Bool(false), 4, 1);
        let b = write(Scope::Match, keys::IS_DEAD, PropValue::Bool(true), 4, 2);

        let mut left = ReplicatedStore::new();
        left.apply(&a);
        left.apply(&b);

        let mut right = ReplicatedStore::new();
        right.apply(&b);
        right.apply(&a);

        assert_eq!(left.get_bool(Scope::Match, keys::IS_DEAD), Some(true));
        assert_eq!(right.get_bool(Scope::Match, keys::IS_DEAD), Some(true));
    }

    #[test]
    fn removing_a_peer_keeps_other_scopes() {
        let mut store = ReplicatedStore::new();
        store.apply(&write(Scope::Peer(PeerId(1)), keys::LIVES, PropValue::Int(2), 1, 1));
        store.apply(&write(Scope::Peer(PeerId(2)), keys::LIVES, PropValue::Int(1), 2, 2));
        store.apply(&write(Scope::Match, keys::CURRENT_ROUND, PropValue::Int(1), 3, 1));

        store.remove_peer(PeerId(1));

        assert_eq!(store.get(Scope::Peer(PeerId(1)), keys::LIVES), None);
        assert_eq!(store.get_i64(Scope::Peer(PeerId(2)), keys::LIVES), Some(1));
        assert_eq!(store.get_i64(Scope::Match, keys::CURRENT_ROUND), Some(1));
        assert_eq!(store.snapshot().len(), 2);
    }
}
