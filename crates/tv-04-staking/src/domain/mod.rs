//! Staking domain: rows, payloads and the pure calculations over them.

pub mod absence;
pub mod award;
pub mod cube;
pub mod entities;
pub mod tx;
pub mod voting_power;

pub use absence::{Absence, AbsentValidators, ABSENT_VALIDATORS_KEY};
pub use award::{
    block_subsidy, mintable_amount, split_tier, split_validator, AwardInfo, RewardDelegation,
    RewardValidator, ValidatorAward, AWARD_ACCUMULATOR_KEY, AWARD_INFO_KEY,
};
pub use cube::{cube_message, verify_cube_signature};
pub use entities::{
    Candidate, CandidateAccountUpdateRequest, CandidateDailyStake, CandidateId, CandidateState,
    DelegateHistory, DelegateOp, Delegation, DelegationSource, Description, RequestState, Slash,
    UnstakeRequest,
};
pub use tx::{DeclareCandidacy, Delegate, StakeTx, UpdateCandidacy};
pub use voting_power::{delegation_voting_power, CandidateFactors};
