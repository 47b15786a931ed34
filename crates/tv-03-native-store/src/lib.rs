//! # Native Store
//!
//! Every storage substrate of the native (non-EVM) state, on one key-value
//! backend.
//!
//! ## Substrates
//!
//! | Type | Role | Feeds |
//! |------|------|-------|
//! | [`VersionedStore`] | authenticated kv: params blob, absent validators, award accumulator | `native_root` |
//! | [`Table`] | journaled relational rows: staking, governance, scheduled txs | `aux_db_root` |
//!
//! ## Atomicity
//!
//! Table changes are turned into [`BatchOperation`]s by [`Journaled::commit_ops`]
//! and handed to [`VersionedStore::commit`], which writes them together with
//! the native data and the new version in a single `atomic_batch_write`. A
//! crash between blocks therefore never leaves the two substrates at different
//! heights.

pub mod adapters;
pub mod config;
pub mod errors;
pub mod merkle;
pub mod ports;
pub mod table;
pub mod versioned;

pub use adapters::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbConfig, RocksDbStore};
pub use config::{NativeStoreConfig, StorageBackend};
pub use errors::{KVStoreError, StoreError, StoreResult};
pub use merkle::{merkle_root, SENTINEL_HASH};
pub use ports::{BatchOperation, KeyValueStore};
pub use table::{Journaled, Record, Savepoint, Table};
pub use versioned::{meta_key, meta_op, VersionedStore};
