//! # Error Types
//!
//! The stable error-code taxonomy surfaced in CheckTx/DeliverTx responses and
//! the parse errors of the primitive types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, user-visible result codes.
///
/// The numeric values are part of the external contract: RPC clients and
/// event consumers match on them, so existing values are never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    Ok = 0,
    InvalidEncoding = 1,
    InvalidSignature = 2,
    BadNonce = 3,
    InsufficientFunds = 4,
    UnknownAddress = 5,
    UnknownTxType = 6,
    InvalidAmount = 7,
    InvalidCompRate = 8,
    DelegationNotFound = 9,
    CandidateExists = 10,
    CandidateNotFound = 11,
    ReachMaxStake = 12,
    InvalidWithdrawalAmount = 13,
    CandidateWithdrawalDisallowed = 14,
    Unauthorized = 15,
    LowGasPrice = 16,
    HighGasLimit = 17,
    LowPriceCapReached = 18,
    CubeSignatureInvalid = 19,
    DuplicateVote = 20,
    ProposalNotFound = 21,
    GasExhausted = 22,
    /// A parameter name or value that does not validate.
    InvalidParameter = 23,
    /// The target entity is in the wrong state for the operation.
    InvalidState = 24,
    /// Proposal expiry missing, duplicated or in the past.
    InvalidExpiry = 25,
    /// Infrastructure failure. Never produced by business-rule checks.
    Internal = 100,
}

impl ErrorCode {
    /// Numeric value placed in the ABCI response.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, ErrorCode::Ok)
    }
}

/// Implemented by every error enum whose variants reach an ABCI response.
pub trait HasErrorCode {
    fn code(&self) -> ErrorCode;
}

/// Failures while parsing primitive types from strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Invalid amount: {0}")]
    Amount(String),

    #[error("Invalid ratio: {0}")]
    Ratio(String),
}

impl HasErrorCode for ParseError {
    fn code(&self) -> ErrorCode {
        match self {
            ParseError::Address(_) => ErrorCode::UnknownAddress,
            ParseError::Amount(_) => ErrorCode::InvalidAmount,
            ParseError::Ratio(_) => ErrorCode::InvalidParameter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::Ok.as_u32(), 0);
        assert_eq!(ErrorCode::InvalidEncoding.as_u32(), 1);
        assert_eq!(ErrorCode::CubeSignatureInvalid.as_u32(), 19);
        assert_eq!(ErrorCode::GasExhausted.as_u32(), 22);
        assert!(ErrorCode::Ok.is_ok());
        assert!(!ErrorCode::BadNonce.is_ok());
    }
}
