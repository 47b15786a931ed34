//! # Versioned Store
//!
//! The authenticated native key-value state. Writes accumulate in a pending
//! overlay during the block; `commit` folds them into the backend in one
//! atomic batch together with any auxiliary rows, bumps the version and
//! returns the new root.
//!
//! ## Key layout in the backend
//!
//! | Prefix | Content | In root |
//! |--------|---------|---------|
//! | `d/`   | native state entries | yes |
//! | `m/`   | version, root, app metadata | no |
//! | other  | auxiliary rows (relational tables) | no |

use shared_types::Hash;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::errors::{StoreError, StoreResult};
use crate::merkle::{leaf_hash, merkle_root};
use crate::ports::{BatchOperation, KeyValueStore};

const DATA_PREFIX: &[u8] = b"d/";
const META_PREFIX: &[u8] = b"m/";
const VERSION_KEY: &str = "version";
const ROOT_KEY: &str = "root";

fn data_key(key: &[u8]) -> Vec<u8> {
    [DATA_PREFIX, key].concat()
}

/// Backend key of a metadata entry.
pub fn meta_key(name: &str) -> Vec<u8> {
    [META_PREFIX, name.as_bytes()].concat()
}

/// Batch operation writing a metadata entry alongside a commit.
pub fn meta_op(name: &str, value: impl Into<Vec<u8>>) -> BatchOperation {
    BatchOperation::put(meta_key(name), value)
}

pub struct VersionedStore<KV: KeyValueStore> {
    kv: KV,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    version: i64,
    root: Hash,
}

impl<KV: KeyValueStore> VersionedStore<KV> {
    /// Opens the store, restoring version and root from the backend.
    pub fn open(kv: KV) -> StoreResult<Self> {
        let version = match kv.get(&meta_key(VERSION_KEY))? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::codec("version", "expected 8 bytes"))?;
                i64::from_be_bytes(arr)
            }
            None => 0,
        };
        let root = match kv.get(&meta_key(ROOT_KEY))? {
            Some(bytes) => Hash::from_slice(&bytes)
                .ok_or_else(|| StoreError::codec("root", "expected 32 bytes"))?,
            None => Hash(merkle_root(Vec::new())),
        };
        debug!(version, root = %root, "Opened versioned store");
        Ok(Self {
            kv,
            pending: BTreeMap::new(),
            version,
            root,
        })
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Root as of the last commit.
    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn kv(&self) -> &KV {
        &self.kv
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Reads through the pending overlay.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.get_committed(key),
        }
    }

    pub fn get_committed(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.kv.get(&data_key(key))?)
    }

    pub fn get_meta(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.kv.get(&meta_key(name))?)
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.pending.insert(key.to_vec(), Some(value));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.pending.insert(key.to_vec(), None);
    }

    /// Entries under `prefix` (overlay applied), keys without the data prefix.
    pub fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .kv
            .prefix_scan(&data_key(prefix))?
            .into_iter()
            .map(|(k, v)| (k[DATA_PREFIX.len()..].to_vec(), v))
            .collect();
        for (key, value) in self.pending.iter().filter(|(k, _)| k.starts_with(prefix)) {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Root the store would have if committed now.
    pub fn working_root(&self) -> StoreResult<Hash> {
        let leaves = self
            .prefix_scan(b"")?
            .iter()
            .map(|(k, v)| leaf_hash(k, v))
            .collect();
        Ok(Hash(merkle_root(leaves)))
    }

    /// Writes the overlay plus `extra` in one batch and advances to `version`.
    ///
    /// `extra` may not touch native data keys.
    pub fn commit(&mut self, version: i64, extra: Vec<BatchOperation>) -> StoreResult<Hash> {
        if let Some(op) = extra.iter().find(|op| op.key().starts_with(DATA_PREFIX)) {
            return Err(StoreError::Config(format!(
                "auxiliary write into native data key {:?}",
                String::from_utf8_lossy(op.key())
            )));
        }

        let root = self.working_root()?;
        let mut ops: Vec<BatchOperation> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, value)| match value {
                Some(v) => BatchOperation::put(data_key(&key), v),
                None => BatchOperation::delete(data_key(&key)),
            })
            .collect();
        let native_writes = ops.len();
        ops.extend(extra);
        ops.push(BatchOperation::put(
            meta_key(VERSION_KEY),
            version.to_be_bytes().to_vec(),
        ));
        ops.push(BatchOperation::put(meta_key(ROOT_KEY), root.0.to_vec()));

        self.kv.atomic_batch_write(ops)?;
        self.version = version;
        self.root = root;
        info!(version, root = %root, native_writes, "Native store committed");
        Ok(root)
    }

    /// Drops every pending write.
    pub fn rollback(&mut self) {
        if !self.pending.is_empty() {
            debug!(discarded = self.pending.len(), "Native store rolled back");
        }
        self.pending.clear();
    }
}
