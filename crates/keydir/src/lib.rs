use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Descriptor locates the latest on-disk value of a key: the data file it
/// lives in and the byte ranges of both the whole record and the value.
///
/// `value_offset` is always `entry_offset + header + key_len`, computed by
/// whoever appended or scanned the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub file_id: u16,
    pub value_size: u16,
    pub entry_offset: u32,
    pub value_offset: u32,
}

/// A directory slot is either a live descriptor or a tombstone.
///
/// The tombstone variant keeps the id of the data file holding the deletion
/// record, so compaction can tell whether the tombstone was consumed by a
/// merge and drop the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Live(Descriptor),
    Tombstone { file_id: u16 },
}

impl Slot {
    /// The data file this slot points into.
    pub fn file_id(&self) -> u16 {
        match self {
            Slot::Live(desc) => desc.file_id,
            Slot::Tombstone { file_id } => *file_id,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Slot::Tombstone { .. })
    }

    /// The live descriptor, if this slot is not a tombstone.
    pub fn descriptor(&self) -> Option<Descriptor> {
        match self {
            Slot::Live(desc) => Some(*desc),
            Slot::Tombstone { .. } => None,
        }
    }
}

/// The in-memory key directory: a concurrency-safe map from key bytes to the
/// slot describing the key's most recent record.
///
/// Lookups take the shared side of the latch, mutations the exclusive side.
/// The directory never stores value bytes.
#[derive(Debug, Default)]
pub struct KeyDir {
    map: RwLock<HashMap<Vec<u8>, Slot>>,
}

impl KeyDir {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(1024)),
        }
    }

    /// Returns the slot for `key`, tombstones included. `Slot` is `Copy`, so
    /// the shared lock is released before the caller sees the result.
    pub fn get(&self, key: &[u8]) -> Option<Slot> {
        self.map.read().get(key).copied()
    }

    /// Inserts or replaces the slot for `key`.
    pub fn set(&self, key: &[u8], slot: Slot) {
        self.map.write().insert(key.to_vec(), slot);
    }

    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// All keys whose latest record is a live value. Tombstoned keys are
    /// skipped.
    pub fn live_keys(&self) -> Vec<Vec<u8>> {
        let map = self.map.read();
        map.iter()
            .filter(|(_, slot)| !slot.is_tombstone())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Applies the result of a merge under one exclusive lock.
    ///
    /// Every slot still pointing into one of `merged` file ids is either
    /// re-pointed at its descriptor in `moved` (the merge rewrote the value)
    /// or removed (the merge dropped the key: tombstoned or superseded).
    /// Slots pointing elsewhere are left alone, so a write that relocated the
    /// key to the active file while the merge ran keeps its newer slot.
    pub fn rewrite(&self, merged: &HashSet<u16>, moved: &HashMap<Vec<u8>, Descriptor>) {
        let mut map = self.map.write();
        map.retain(|key, slot| {
            if !merged.contains(&slot.file_id()) {
                return true;
            }
            match moved.get(key) {
                Some(desc) => {
                    *slot = Slot::Live(*desc);
                    true
                }
                None => false,
            }
        });
    }
}
