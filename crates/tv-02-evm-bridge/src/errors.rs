//! Error types for the EVM bridge

use shared_types::{Address, Amount, ErrorCode, HasErrorCode};
use thiserror::Error;

/// Result type alias for bridge operations
pub type EvmResult<T> = Result<T, EvmError>;

/// Errors raised while validating or executing Ethereum transactions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvmError {
    #[error("Transaction size {size} exceeds limit {max}")]
    TxTooLarge { size: usize, max: usize },

    #[error("Invalid transaction encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid chain id: expected {expected}, got {actual:?}")]
    InvalidChainId { expected: u64, actual: Option<u64> },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Unknown account {0}")]
    UnknownAccount(Address),

    #[error("Intrinsic gas too low: have {gas}, need {required}")]
    IntrinsicGas { gas: u64, required: u64 },

    #[error("Gas {gas} exceeds block gas limit {limit}")]
    BlockGasLimit { gas: u64, limit: u64 },

    #[error("Nonce not strictly increasing. Expected {expected} Got {actual}")]
    BadNonce { expected: u64, actual: u64 },

    #[error("Insufficient funds: balance {balance}, cost {cost}")]
    InsufficientFunds { balance: Amount, cost: Amount },

    #[error("The gas price is too low for transaction")]
    LowGasPrice,

    #[error("Low-price transaction gas {gas} exceeds limit {limit}")]
    LowPriceGasLimit { gas: u64, limit: u64 },

    #[error("Low-price transaction slots exhausted ({cap} per block)")]
    LowPriceCapReached { cap: i64 },

    #[error("Account {0} has a stake/governance operation in the current block")]
    PendingNativeTx(Address),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("World state error: {0}")]
    State(String),
}

impl HasErrorCode for EvmError {
    fn code(&self) -> ErrorCode {
        match self {
            EvmError::TxTooLarge { .. } | EvmError::InvalidEncoding(_) => ErrorCode::InvalidEncoding,
            EvmError::InvalidChainId { .. } | EvmError::InvalidSignature(_) => {
                ErrorCode::InvalidSignature
            }
            EvmError::UnknownAccount(_) => ErrorCode::UnknownAddress,
            EvmError::IntrinsicGas { .. } => ErrorCode::GasExhausted,
            EvmError::BlockGasLimit { .. } | EvmError::LowPriceGasLimit { .. } => {
                ErrorCode::HighGasLimit
            }
            EvmError::BadNonce { .. } => ErrorCode::BadNonce,
            EvmError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            EvmError::LowGasPrice => ErrorCode::LowGasPrice,
            EvmError::LowPriceCapReached { .. } => ErrorCode::LowPriceCapReached,
            EvmError::PendingNativeTx(_) => ErrorCode::InvalidState,
            EvmError::Execution(_) | EvmError::State(_) => ErrorCode::Internal,
        }
    }
}
