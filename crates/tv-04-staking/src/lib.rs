//! # Staking
//!
//! Delegated proof of stake for the native transaction path.
//!
//! ## Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`domain`] | rows, tx payloads, voting-power and award arithmetic, cube check |
//! | [`store`] | the seven staking tables as one journaled unit |
//! | [`service`] | tx validation/mutation and every EndBlock duty |
//!
//! ## Money movement
//!
//! The service never touches balances directly. Every movement is queued as a
//! [`shared_types::Transfer`] on the caller's ledger:
//!
//! ```text
//! stake / recharge      sender ──► HOLD
//! unstake completion    HOLD   ──► delegator
//! slash                 HOLD   ──► MINT (burn)
//! reward                MINT   ──► HOLD
//! gas                   sender ──► MINT (burn)
//! ```
//!
//! so `HOLD` always equals the sum of staked plus pending-withdraw amounts.

pub mod domain;
pub mod errors;
pub mod service;
pub mod store;

pub use domain::{
    AbsentValidators, AwardInfo, Candidate, CandidateState, DelegateOp, Delegation, StakeTx,
    ABSENT_VALIDATORS_KEY, AWARD_ACCUMULATOR_KEY, AWARD_INFO_KEY,
};
pub use errors::{StakeError, StakeResult};
pub use service::{
    diff_validator_sets, StakingService, TxContext, TxOutcome, ValidatorUpdate, ABSENT_REASON,
    BAD_PROPOSER_REASON, BYZANTINE_REASON,
};
pub use store::{StakingSavepoint, StakingStore};
