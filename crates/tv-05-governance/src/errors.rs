//! Error types for the governance engine

use shared_types::{Amount, ErrorCode, HasErrorCode};
use thiserror::Error;
use tv_03_native_store::StoreError;

pub type GovResult<T> = Result<T, GovernanceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceError {
    #[error("Unknown governance transaction: {0}")]
    UnknownTxType(String),

    #[error("Malformed governance payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid validator")]
    InvalidValidator,

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Provide one expiration at most")]
    ExceedsExpiration,

    #[error("Invalid expire block height")]
    InvalidExpireBlockHeight,

    #[error("Invalid expire timestamp")]
    InvalidExpireTimestamp,

    #[error("The proposal's block height is too close")]
    ExpirationTooClose,

    #[error("Amount must be > 0")]
    InvalidAmount,

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Proposal {0} not found")]
    ProposalNotFound(String),

    #[error("Proposal {0} has already been finalized")]
    ProposalFinalized(String),

    #[error("Repeated vote")]
    DuplicateVote,

    #[error("Invalid ENI lib name or version")]
    InvalidNewLib,

    #[error("One or more ongoing proposal with the same lib name {0}")]
    OngoingLibFound(String),

    #[error("Found unresolved or approved retiring proposal")]
    OngoingRetiringFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HasErrorCode for GovernanceError {
    fn code(&self) -> ErrorCode {
        match self {
            GovernanceError::UnknownTxType(_) => ErrorCode::UnknownTxType,
            GovernanceError::InvalidPayload(_) => ErrorCode::InvalidEncoding,
            GovernanceError::InvalidValidator | GovernanceError::Unauthorized(_) => {
                ErrorCode::Unauthorized
            }
            GovernanceError::ExceedsExpiration
            | GovernanceError::InvalidExpireBlockHeight
            | GovernanceError::InvalidExpireTimestamp
            | GovernanceError::ExpirationTooClose => ErrorCode::InvalidExpiry,
            GovernanceError::InvalidAmount => ErrorCode::InvalidAmount,
            GovernanceError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            GovernanceError::InvalidParameter(_) | GovernanceError::InvalidNewLib => {
                ErrorCode::InvalidParameter
            }
            GovernanceError::ProposalNotFound(_) => ErrorCode::ProposalNotFound,
            GovernanceError::ProposalFinalized(_)
            | GovernanceError::OngoingLibFound(_)
            | GovernanceError::OngoingRetiringFound => ErrorCode::InvalidState,
            GovernanceError::DuplicateVote => ErrorCode::DuplicateVote,
            GovernanceError::Store(_) => ErrorCode::Internal,
        }
    }
}
