//! Consecutive-absence tracking for validators.

use serde::{Deserialize, Serialize};
use shared_types::{BlockHeight, PubKey};
use std::collections::BTreeMap;

/// Native kv key of the persisted map.
pub const ABSENT_VALIDATORS_KEY: &[u8] = b"stake/absent_validators";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Absence {
    pub count: i16,
    pub last_block_height: BlockHeight,
}

/// Validators that missed the most recent blocks, keyed by pub_key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbsentValidators {
    entries: BTreeMap<PubKey, Absence>,
}

impl AbsentValidators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `pub_key` did not sign the block before `height`.
    ///
    /// The count grows only across consecutive heights; a gap restarts it.
    pub fn add(&mut self, pub_key: PubKey, height: BlockHeight) {
        let entry = self.entries.entry(pub_key).or_insert(Absence {
            count: 0,
            last_block_height: height - 1,
        });
        if entry.last_block_height == height - 1 {
            entry.count = entry.count.saturating_add(1);
        } else {
            entry.count = 1;
        }
        entry.last_block_height = height;
    }

    /// Drops every validator that was not reported absent at `height`.
    pub fn clear_stale(&mut self, height: BlockHeight) {
        self.entries.retain(|_, a| a.last_block_height == height);
    }

    pub fn remove(&mut self, pub_key: &PubKey) {
        self.entries.remove(pub_key);
    }

    pub fn get(&self, pub_key: &PubKey) -> Option<&Absence> {
        self.entries.get(pub_key)
    }

    pub fn contains(&self, pub_key: &PubKey) -> bool {
        self.entries.contains_key(pub_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PubKey, &Absence)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
