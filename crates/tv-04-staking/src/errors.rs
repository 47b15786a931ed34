//! Error types for the staking engine

use shared_types::{Address, Amount, ErrorCode, HasErrorCode, PubKey};
use thiserror::Error;
use tv_03_native_store::StoreError;

pub type StakeResult<T> = Result<T, StakeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakeError {
    #[error("Unknown staking transaction: {0}")]
    UnknownTxType(String),

    #[error("Malformed staking payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid public key: {0:?}")]
    InvalidPubKey(String),

    #[error("Amount must be > 0")]
    InvalidAmount,

    #[error("Compensation rate must be between 0 and 1")]
    InvalidCompRate,

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("Address {0} has been declared")]
    CandidateExists(Address),

    #[error("PubKey {0} has been declared")]
    PubKeyExists(PubKey),

    #[error("Candidate does not exist for {0}")]
    CandidateNotFound(String),

    #[error("Candidate has withdrawn its candidacy")]
    CandidateWithdrawn,

    #[error("Candidate has been activated")]
    CandidateAlreadyActivated,

    #[error("Candidate has been deactivated")]
    CandidateAlreadyDeactivated,

    #[error("Verification disallowed for {0}")]
    VerificationDisallowed(Address),

    #[error("Validator has reached its declared max amount to be staked")]
    ReachMaxStake,

    #[error("No corresponding delegation exists")]
    DelegationNotFound,

    #[error("Invalid withdrawal amount")]
    InvalidWithdrawalAmount,

    #[error("Candidate can't withdraw the self-staking funds")]
    CandidateWithdrawalDisallowed,

    #[error("Invalid cube signature: {0}")]
    CubeSignature(String),

    #[error("Candidate has pending withdrawal requests")]
    PendingUnstakeRequests,

    #[error("Bad request: {0}")]
    BadRequest(&'static str),

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HasErrorCode for StakeError {
    fn code(&self) -> ErrorCode {
        match self {
            StakeError::UnknownTxType(_) => ErrorCode::UnknownTxType,
            StakeError::InvalidPayload(_) | StakeError::InvalidPubKey(_) => {
                ErrorCode::InvalidEncoding
            }
            StakeError::InvalidAmount => ErrorCode::InvalidAmount,
            StakeError::InvalidCompRate => ErrorCode::InvalidCompRate,
            StakeError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            StakeError::CandidateExists(_) | StakeError::PubKeyExists(_) => {
                ErrorCode::CandidateExists
            }
            StakeError::CandidateNotFound(_) => ErrorCode::CandidateNotFound,
            StakeError::CandidateWithdrawn
            | StakeError::CandidateAlreadyActivated
            | StakeError::CandidateAlreadyDeactivated
            | StakeError::PendingUnstakeRequests
            | StakeError::BadRequest(_) => ErrorCode::InvalidState,
            StakeError::VerificationDisallowed(_) | StakeError::Unauthorized(_) => {
                ErrorCode::Unauthorized
            }
            StakeError::ReachMaxStake => ErrorCode::ReachMaxStake,
            StakeError::DelegationNotFound => ErrorCode::DelegationNotFound,
            StakeError::InvalidWithdrawalAmount => ErrorCode::InvalidWithdrawalAmount,
            StakeError::CandidateWithdrawalDisallowed => ErrorCode::CandidateWithdrawalDisallowed,
            StakeError::CubeSignature(_) => ErrorCode::CubeSignatureInvalid,
            StakeError::Store(_) => ErrorCode::Internal,
        }
    }
}
