//! Error types for the application driver

use shared_types::{ErrorCode, HasErrorCode};
use thiserror::Error;
use tv_01_params::ParamError;
use tv_02_evm_bridge::EvmError;
use tv_03_native_store::StoreError;
use tv_04_staking::StakeError;
use tv_05_governance::GovernanceError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Evm(#[from] EvmError),

    #[error(transparent)]
    Stake(#[from] StakeError),

    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid native envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Unknown transaction type: {0}")]
    UnknownTxType(String),

    #[error("Unknown query path: {0}")]
    UnknownQuery(String),

    #[error("Invalid query data: {0}")]
    InvalidQuery(String),

    #[error("Corrupt native state under {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("Chain already initialized at height {0}")]
    AlreadyInitialized(i64),
}

impl AppError {
    pub(crate) fn corrupt(key: &[u8], err: impl std::fmt::Display) -> Self {
        AppError::Corrupt {
            key: String::from_utf8_lossy(key).into_owned(),
            message: err.to_string(),
        }
    }

    /// True for failures of the storage substrates; the node must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Store(_) | AppError::Corrupt { .. } => true,
            AppError::Stake(StakeError::Store(_)) => true,
            AppError::Governance(GovernanceError::Store(_)) => true,
            AppError::Evm(EvmError::State(_)) => true,
            _ => false,
        }
    }
}

impl HasErrorCode for AppError {
    fn code(&self) -> ErrorCode {
        match self {
            AppError::Evm(e) => e.code(),
            AppError::Stake(e) => e.code(),
            AppError::Governance(e) => e.code(),
            AppError::Param(e) => e.code(),
            AppError::Store(e) => e.code(),
            AppError::InvalidEnvelope(_) | AppError::InvalidQuery(_) => ErrorCode::InvalidEncoding,
            AppError::UnknownTxType(_) | AppError::UnknownQuery(_) => ErrorCode::UnknownTxType,
            AppError::AlreadyInitialized(_) => ErrorCode::InvalidState,
            AppError::Corrupt { .. } => ErrorCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_pass_through() {
        let err = AppError::from(StakeError::ReachMaxStake);
        assert_eq!(err.code(), ErrorCode::ReachMaxStake);
        let err = AppError::from(GovernanceError::DuplicateVote);
        assert_eq!(err.code(), ErrorCode::DuplicateVote);
        let err = AppError::UnknownTxType("bank/send".into());
        assert_eq!(err.code().as_u32(), 6);
    }

    #[test]
    fn test_store_failures_are_fatal() {
        let store = StoreError::Config("disk".into());
        assert!(AppError::from(store.clone()).is_fatal());
        assert!(AppError::from(StakeError::Store(store)).is_fatal());
        assert!(!AppError::from(StakeError::InvalidAmount).is_fatal());
        assert!(!AppError::InvalidEnvelope("x".into()).is_fatal());
    }
}
