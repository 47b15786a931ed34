//! # Journaled Relational Tables
//!
//! In-memory tables with a primary key, secondary indexes and an undo
//! journal. A table participates in the block transaction:
//!
//! ```text
//! BeginBlock ─► savepoint per tx ─► rollback_to on tx failure
//!                                  │
//! Commit ─► commit_ops() ─► BatchOperations into the kv backend
//! Abort  ─► rollback()   ─► every change since the last commit undone
//! ```
//!
//! Rows are persisted as bincode under `t/<table>/<bincode(key)>`; the
//! auto-increment counter under `t/<table>#next_id`. [`Table::digest`] hashes
//! the canonical bytes of every row in key order and feeds `aux_db_root`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::errors::{StoreError, StoreResult};
use crate::ports::{BatchOperation, KeyValueStore};

/// A row type stored in a [`Table`].
pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync {
    /// Table name; also the persistence prefix.
    const TABLE: &'static str;

    /// Secondary indexes whose values must be unique.
    const UNIQUE_INDEXES: &'static [&'static str] = &[];

    type Key: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync;

    fn key(&self) -> Self::Key;

    /// `(index name, value)` pairs for every secondary index.
    fn index_values(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Explicit field-ordered encoding used for the table digest.
    fn canonical_bytes(&self) -> Vec<u8>;
}

/// A position in a table's journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint {
    journal_len: usize,
    next_id: u64,
}

/// Transactional behaviour shared by tables and stores made of tables.
pub trait Journaled {
    type Savepoint: Clone;

    fn savepoint(&self) -> Self::Savepoint;

    /// Undoes every change made after `savepoint`.
    fn rollback_to(&mut self, savepoint: Self::Savepoint);

    /// Persists every change since the last commit and clears the journal.
    fn commit_ops(&mut self) -> StoreResult<Vec<BatchOperation>>;

    /// Undoes every change since the last commit.
    fn rollback(&mut self);

    /// Digest of the full content.
    fn digest(&self) -> [u8; 32];
}

type IndexKey = (&'static str, String);

#[derive(Debug, Clone)]
pub struct Table<R: Record> {
    rows: BTreeMap<R::Key, R>,
    indexes: BTreeMap<IndexKey, BTreeSet<R::Key>>,
    journal: Vec<(R::Key, Option<R>)>,
    next_id: u64,
    committed_next_id: u64,
}

impl<R: Record> Default for Table<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn row_prefix(table: &str) -> Vec<u8> {
    format!("t/{table}/").into_bytes()
}

fn next_id_key(table: &str) -> Vec<u8> {
    format!("t/{table}#next_id").into_bytes()
}

impl<R: Record> Table<R> {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            indexes: BTreeMap::new(),
            journal: Vec::new(),
            next_id: 1,
            committed_next_id: 1,
        }
    }

    /// Loads every persisted row of this table.
    pub fn load<KV: KeyValueStore + ?Sized>(kv: &KV) -> StoreResult<Self> {
        let mut table = Self::new();
        for (_, value) in kv.prefix_scan(&row_prefix(R::TABLE))? {
            let row: R = bincode::deserialize(&value)
                .map_err(|e| StoreError::codec(R::TABLE, e))?;
            table.index_insert(&row);
            table.rows.insert(row.key(), row);
        }
        if let Some(bytes) = kv.get(&next_id_key(R::TABLE))? {
            let id: u64 =
                bincode::deserialize(&bytes).map_err(|e| StoreError::codec(R::TABLE, e))?;
            table.next_id = id;
            table.committed_next_id = id;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.rows.get(key)
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        self.rows.contains_key(key)
    }

    /// Rows in primary-key order.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rows.values()
    }

    /// Rows whose `index` equals `value`, in primary-key order.
    pub fn find_by(&self, index: &'static str, value: &str) -> Vec<&R> {
        self.indexes
            .get(&(index, value.to_string()))
            .map(|keys| keys.iter().filter_map(|k| self.rows.get(k)).collect())
            .unwrap_or_default()
    }

    pub fn find_one_by(&self, index: &'static str, value: &str) -> Option<&R> {
        self.find_by(index, value).into_iter().next()
    }

    /// Allocates the next surrogate id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, row: R) -> StoreResult<()> {
        let key = row.key();
        if self.rows.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                table: R::TABLE,
                key: format!("{key:?}"),
            });
        }
        self.check_unique(&row, None)?;
        self.write(key, Some(row));
        Ok(())
    }

    pub fn update(&mut self, row: R) -> StoreResult<()> {
        let key = row.key();
        if !self.rows.contains_key(&key) {
            return Err(StoreError::RowNotFound {
                table: R::TABLE,
                key: format!("{key:?}"),
            });
        }
        self.check_unique(&row, Some(&key))?;
        self.write(key, Some(row));
        Ok(())
    }

    pub fn upsert(&mut self, row: R) -> StoreResult<()> {
        let key = row.key();
        self.check_unique(&row, Some(&key))?;
        self.write(key, Some(row));
        Ok(())
    }

    pub fn remove(&mut self, key: &R::Key) -> StoreResult<R> {
        let row = self.rows.get(key).cloned().ok_or_else(|| StoreError::RowNotFound {
            table: R::TABLE,
            key: format!("{key:?}"),
        })?;
        self.write(key.clone(), None);
        Ok(row)
    }

    /// Removes every row matching `predicate`; returns how many.
    pub fn remove_where<F: Fn(&R) -> bool>(&mut self, predicate: F) -> usize {
        let keys: Vec<R::Key> = self
            .rows
            .iter()
            .filter(|(_, row)| predicate(row))
            .map(|(k, _)| k.clone())
            .collect();
        let count = keys.len();
        for key in keys {
            self.write(key, None);
        }
        count
    }

    /// Keys changed since the last commit.
    pub fn dirty_keys(&self) -> BTreeSet<R::Key> {
        self.journal.iter().map(|(k, _)| k.clone()).collect()
    }

    fn check_unique(&self, row: &R, own_key: Option<&R::Key>) -> StoreResult<()> {
        for (index, value) in row.index_values() {
            if !R::UNIQUE_INDEXES.contains(&index) {
                continue;
            }
            if let Some(keys) = self.indexes.get(&(index, value.clone())) {
                if keys.iter().any(|k| Some(k) != own_key) {
                    return Err(StoreError::UniqueViolation {
                        table: R::TABLE,
                        index,
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    fn write(&mut self, key: R::Key, row: Option<R>) {
        let previous = self.set_raw(key.clone(), row);
        self.journal.push((key, previous));
    }

    fn set_raw(&mut self, key: R::Key, row: Option<R>) -> Option<R> {
        let previous = match row {
            Some(row) => {
                self.index_insert(&row);
                self.rows.insert(key.clone(), row)
            }
            None => self.rows.remove(&key),
        };
        if let Some(old) = &previous {
            self.index_remove(old);
            if let Some(current) = self.rows.get(&key).cloned() {
                self.index_insert(&current);
            }
        }
        previous
    }

    fn index_insert(&mut self, row: &R) {
        let key = row.key();
        for entry in row.index_values() {
            self.indexes.entry(entry).or_default().insert(key.clone());
        }
    }

    fn index_remove(&mut self, row: &R) {
        let key = row.key();
        for entry in row.index_values() {
            if let Some(keys) = self.indexes.get_mut(&entry) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.indexes.remove(&entry);
                }
            }
        }
    }
}

impl<R: Record> Journaled for Table<R> {
    type Savepoint = Savepoint;

    fn savepoint(&self) -> Savepoint {
        Savepoint {
            journal_len: self.journal.len(),
            next_id: self.next_id,
        }
    }

    fn rollback_to(&mut self, savepoint: Savepoint) {
        while self.journal.len() > savepoint.journal_len {
            let Some((key, previous)) = self.journal.pop() else {
                break;
            };
            self.set_raw(key, previous);
        }
        self.next_id = savepoint.next_id;
    }

    fn commit_ops(&mut self) -> StoreResult<Vec<BatchOperation>> {
        let prefix = row_prefix(R::TABLE);
        let mut ops = Vec::new();
        for key in self.dirty_keys() {
            let key_bytes =
                bincode::serialize(&key).map_err(|e| StoreError::codec(R::TABLE, e))?;
            let storage_key = [prefix.as_slice(), key_bytes.as_slice()].concat();
            match self.rows.get(&key) {
                Some(row) => {
                    let value =
                        bincode::serialize(row).map_err(|e| StoreError::codec(R::TABLE, e))?;
                    ops.push(BatchOperation::put(storage_key, value));
                }
                None => ops.push(BatchOperation::delete(storage_key)),
            }
        }
        if self.next_id != self.committed_next_id {
            let value =
                bincode::serialize(&self.next_id).map_err(|e| StoreError::codec(R::TABLE, e))?;
            ops.push(BatchOperation::put(next_id_key(R::TABLE), value));
        }
        self.journal.clear();
        self.committed_next_id = self.next_id;
        Ok(ops)
    }

    fn rollback(&mut self) {
        self.rollback_to(Savepoint {
            journal_len: 0,
            next_id: self.committed_next_id,
        });
    }

    fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(R::TABLE.as_bytes());
        for row in self.rows.values() {
            let bytes = row.canonical_bytes();
            hasher.update((bytes.len() as u32).to_be_bytes());
            hasher.update(&bytes);
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKVStore;
    use serde::Deserialize;
    use shared_types::CanonicalEncoder;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        id: u64,
        email: String,
        team: String,
    }

    impl Record for Person {
        const TABLE: &'static str = "people";
        const UNIQUE_INDEXES: &'static [&'static str] = &["email"];
        type Key = u64;

        fn key(&self) -> u64 {
            self.id
        }

        fn index_values(&self) -> Vec<(&'static str, String)> {
            vec![("email", self.email.clone()), ("team", self.team.clone())]
        }

        fn canonical_bytes(&self) -> Vec<u8> {
            CanonicalEncoder::new()
                .u64(self.id)
                .str(&self.email)
                .str(&self.team)
                .finish()
        }
    }

    fn person(table: &mut Table<Person>, email: &str, team: &str) -> Person {
        Person {
            id: table.next_id(),
            email: email.to_string(),
            team: team.to_string(),
        }
    }

    #[test]
    fn test_insert_and_index_lookup() {
        let mut table = Table::<Person>::new();
        let a = person(&mut table, "a@x", "red");
        let b = person(&mut table, "b@x", "red");
        table.insert(a.clone()).unwrap();
        table.insert(b).unwrap();

        assert_eq!(table.find_by("team", "red").len(), 2);
        assert_eq!(table.find_one_by("email", "a@x"), Some(&a));
        assert!(table.find_by("team", "blue").is_empty());
    }

    #[test]
    fn test_unique_index_enforced() {
        let mut table = Table::<Person>::new();
        let a = person(&mut table, "a@x", "red");
        table.insert(a).unwrap();
        let dup = person(&mut table, "a@x", "blue");
        assert!(matches!(
            table.insert(dup),
            Err(StoreError::UniqueViolation { index: "email", .. })
        ));
    }

    #[test]
    fn test_update_moves_index_entries() {
        let mut table = Table::<Person>::new();
        let mut a = person(&mut table, "a@x", "red");
        table.insert(a.clone()).unwrap();
        a.team = "blue".to_string();
        table.update(a).unwrap();

        assert!(table.find_by("team", "red").is_empty());
        assert_eq!(table.find_by("team", "blue").len(), 1);
    }

    #[test]
    fn test_savepoint_rollback_restores_rows_indexes_and_ids() {
        let mut table = Table::<Person>::new();
        let a = person(&mut table, "a@x", "red");
        table.insert(a.clone()).unwrap();

        let sp = table.savepoint();
        let b = person(&mut table, "b@x", "red");
        table.insert(b).unwrap();
        let mut changed = a.clone();
        changed.team = "blue".to_string();
        table.update(changed).unwrap();
        table.rollback_to(sp);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&a.id), Some(&a));
        assert_eq!(table.find_by("team", "red").len(), 1);
        assert!(table.find_by("team", "blue").is_empty());
        assert_eq!(table.next_id(), 2);
    }

    #[test]
    fn test_commit_persists_and_reloads() {
        let mut kv = InMemoryKVStore::new();
        let mut table = Table::<Person>::new();
        let a = person(&mut table, "a@x", "red");
        let b = person(&mut table, "b@x", "red");
        table.insert(a.clone()).unwrap();
        table.insert(b.clone()).unwrap();
        kv.atomic_batch_write(table.commit_ops().unwrap()).unwrap();

        table.remove(&b.id).unwrap();
        kv.atomic_batch_write(table.commit_ops().unwrap()).unwrap();

        let mut loaded = Table::<Person>::load(&kv).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&a.id), Some(&a));
        assert_eq!(loaded.digest(), table.digest());
        assert_eq!(loaded.next_id(), 3);
    }

    #[test]
    fn test_block_rollback_undoes_uncommitted_only() {
        let mut table = Table::<Person>::new();
        let a = person(&mut table, "a@x", "red");
        table.insert(a).unwrap();
        table.commit_ops().unwrap();
        let digest = table.digest();

        let b = person(&mut table, "b@x", "red");
        table.insert(b).unwrap();
        table.remove_where(|_| true);
        assert!(table.is_empty());

        table.rollback();
        assert_eq!(table.len(), 1);
        assert_eq!(table.digest(), digest);
    }

    #[test]
    fn test_digest_independent_of_insert_order() {
        let rows = [
            Person { id: 1, email: "a".into(), team: "t".into() },
            Person { id: 2, email: "b".into(), team: "t".into() },
        ];
        let mut first = Table::<Person>::new();
        first.insert(rows[0].clone()).unwrap();
        first.insert(rows[1].clone()).unwrap();
        let mut second = Table::<Person>::new();
        second.insert(rows[1].clone()).unwrap();
        second.insert(rows[0].clone()).unwrap();
        assert_eq!(first.digest(), second.digest());
    }
}
