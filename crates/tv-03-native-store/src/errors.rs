//! Error types for the native store

use shared_types::{ErrorCode, HasErrorCode};
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from a key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    /// Data corruption in the store.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },
}

/// Errors from the versioned store and relational tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Kv(#[from] KVStoreError),

    #[error("Codec error in {context}: {message}")]
    Codec { context: String, message: String },

    #[error("Duplicate primary key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },

    #[error("Unique index {index} violated in {table}: {value}")]
    UniqueViolation {
        table: &'static str,
        index: &'static str,
        value: String,
    },

    #[error("Row not found in {table}: {key}")]
    RowNotFound { table: &'static str, key: String },

    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn codec(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StoreError::Codec {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

impl HasErrorCode for StoreError {
    fn code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}
