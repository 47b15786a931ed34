//! Storage backend selection

use serde::Deserialize;
use tracing::info;

use crate::adapters::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
use crate::adapters::{RocksDbConfig, RocksDbStore};
use crate::errors::{StoreError, StoreResult};
use crate::ports::KeyValueStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[cfg(feature = "rocksdb")]
    RocksDb(RocksDbConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NativeStoreConfig {
    pub backend: StorageBackend,
}

impl Default for NativeStoreConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
        }
    }
}

impl NativeStoreConfig {
    /// Opens the configured backend.
    pub fn open_backend(&self) -> StoreResult<Box<dyn KeyValueStore>> {
        match &self.backend {
            StorageBackend::Memory => {
                info!("Using in-memory native store");
                Ok(Box::new(InMemoryKVStore::new()))
            }
            #[cfg(feature = "rocksdb")]
            StorageBackend::RocksDb(config) => {
                if config.path.is_empty() {
                    return Err(StoreError::Config("rocksdb path is empty".to_string()));
                }
                Ok(Box::new(RocksDbStore::open(config.clone())?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        let config = NativeStoreConfig::default();
        assert!(matches!(config.backend, StorageBackend::Memory));
        let kv = config.open_backend().unwrap();
        assert!(kv.prefix_scan(b"").unwrap().is_empty());
    }

    #[cfg(feature = "rocksdb")]
    #[test]
    fn test_rocksdb_backend_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let json = format!(
            r#"{{"backend": {{"kind": "rocks_db", "path": "{}"}}}}"#,
            dir.path().join("db").display()
        );
        let config: NativeStoreConfig = serde_json::from_str(&json).unwrap();
        let mut kv = config.open_backend().unwrap();
        kv.put(b"k", b"v").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[cfg(feature = "rocksdb")]
    #[test]
    fn test_empty_rocksdb_path_rejected() {
        let config = NativeStoreConfig {
            backend: StorageBackend::RocksDb(RocksDbConfig::for_testing("")),
        };
        assert!(matches!(config.open_backend(), Err(StoreError::Config(_))));
    }
}
