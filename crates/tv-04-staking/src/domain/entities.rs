//! # Staking Rows
//!
//! Every row type of the staking store. Cross-row references use surrogate
//! ids (`candidate_id`) or addresses, never embedded rows.
//!
//! Amounts are wei (`BigInt`), ratios exact (`BigRational`). Each row writes
//! its fields in declaration order through [`CanonicalEncoder`] for the
//! auxiliary root.

use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use shared_types::{
    amount_serde, mul_ratio_floor, ratio_serde, Address, Amount, BlockHeight, CanonicalEncoder,
    PubKey, Ratio,
};
use tv_03_native_store::Record;

pub type CandidateId = u64;

/// Ranking outcome of the last validator-set update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateState {
    #[serde(rename = "Validator")]
    Validator,
    #[serde(rename = "Backup Validator")]
    BackupValidator,
    #[serde(rename = "Candidate")]
    Candidate,
}

impl CandidateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateState::Validator => "Validator",
            CandidateState::BackupValidator => "Backup Validator",
            CandidateState::Candidate => "Candidate",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Description {
    pub name: String,
    pub website: String,
    pub location: String,
    pub email: String,
    pub profile: String,
}

impl Description {
    fn encode(&self, enc: CanonicalEncoder) -> CanonicalEncoder {
        enc.str(&self.name)
            .str(&self.website)
            .str(&self.location)
            .str(&self.email)
            .str(&self.profile)
    }
}

/// A validator registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub pub_key: PubKey,
    pub owner_address: Address,
    /// Total stake, including amounts waiting in unstake requests.
    #[serde(with = "amount_serde")]
    pub shares: Amount,
    pub voting_power: i64,
    pub pending_voting_power: i64,
    #[serde(with = "amount_serde")]
    pub max_shares: Amount,
    #[serde(with = "ratio_serde")]
    pub comp_rate: Ratio,
    pub description: Description,
    pub verified: bool,
    pub active: bool,
    pub block_height: BlockHeight,
    pub rank: u32,
    pub state: CandidateState,
    pub num_of_delegators: u64,
    pub created_at: i64,
}

impl Candidate {
    /// Stake the owner must keep delegated: `floor(max_shares × ratio)`.
    pub fn self_staking_amount(&self, ratio: &Ratio) -> Amount {
        mul_ratio_floor(&self.max_shares, ratio)
    }

    /// True once the candidacy was withdrawn.
    pub fn is_withdrawn(&self) -> bool {
        !self.shares.is_positive()
    }
}

impl Record for Candidate {
    const TABLE: &'static str = "candidates";
    const UNIQUE_INDEXES: &'static [&'static str] = &["pub_key", "owner"];
    type Key = CandidateId;

    fn key(&self) -> CandidateId {
        self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("pub_key", self.pub_key.to_string()),
            ("owner", self.owner_address.to_string()),
        ]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let enc = CanonicalEncoder::new()
            .u64(self.id)
            .str(self.pub_key.as_str())
            .address(&self.owner_address)
            .amount(&self.shares)
            .i64(self.voting_power)
            .i64(self.pending_voting_power)
            .amount(&self.max_shares)
            .ratio(&self.comp_rate);
        self.description
            .encode(enc)
            .bool(self.verified)
            .bool(self.active)
            .i64(self.block_height)
            .u64(u64::from(self.rank))
            .str(self.state.as_str())
            .u64(self.num_of_delegators)
            .i64(self.created_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationSource {
    /// Pre-authorized by a cube signature.
    Cube,
    Wallet,
}

/// A delegator's stake position in one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: u64,
    pub delegator_address: Address,
    pub candidate_id: CandidateId,
    #[serde(with = "amount_serde")]
    pub delegate_amount: Amount,
    #[serde(with = "amount_serde")]
    pub award_amount: Amount,
    #[serde(with = "amount_serde")]
    pub withdraw_amount: Amount,
    #[serde(with = "amount_serde")]
    pub pending_withdraw_amount: Amount,
    #[serde(with = "amount_serde")]
    pub slash_amount: Amount,
    #[serde(with = "ratio_serde")]
    pub comp_rate: Ratio,
    pub voting_power: i64,
    /// Days, accumulated once per staking-date interval.
    pub average_staking_date: i64,
    pub block_height: BlockHeight,
    pub source: DelegationSource,
}

impl Delegation {
    pub fn new(
        id: u64,
        delegator_address: Address,
        candidate: &Candidate,
        height: BlockHeight,
        source: DelegationSource,
    ) -> Self {
        Self {
            id,
            delegator_address,
            candidate_id: candidate.id,
            delegate_amount: Amount::zero(),
            award_amount: Amount::zero(),
            withdraw_amount: Amount::zero(),
            pending_withdraw_amount: Amount::zero(),
            slash_amount: Amount::zero(),
            comp_rate: candidate.comp_rate.clone(),
            voting_power: 0,
            average_staking_date: 0,
            block_height: height,
            source,
        }
    }

    /// `delegate + award − withdraw − slash − pending_withdraw`.
    pub fn shares(&self) -> Amount {
        &self.delegate_amount + &self.award_amount
            - &self.withdraw_amount
            - &self.slash_amount
            - &self.pending_withdraw_amount
    }

    /// Shares plus amounts still waiting in unstake requests; this is what
    /// the candidate's `shares` counts.
    pub fn locked_amount(&self) -> Amount {
        self.shares() + &self.pending_withdraw_amount
    }

    pub fn pair_key(delegator: &Address, candidate_id: CandidateId) -> String {
        format!("{delegator}/{candidate_id}")
    }
}

impl Record for Delegation {
    const TABLE: &'static str = "delegations";
    const UNIQUE_INDEXES: &'static [&'static str] = &["pair"];
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("pair", Self::pair_key(&self.delegator_address, self.candidate_id)),
            ("delegator", self.delegator_address.to_string()),
            ("candidate", self.candidate_id.to_string()),
        ]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new()
            .u64(self.id)
            .address(&self.delegator_address)
            .u64(self.candidate_id)
            .amount(&self.delegate_amount)
            .amount(&self.award_amount)
            .amount(&self.withdraw_amount)
            .amount(&self.pending_withdraw_amount)
            .amount(&self.slash_amount)
            .ratio(&self.comp_rate)
            .i64(self.voting_power)
            .i64(self.average_staking_date)
            .i64(self.block_height)
            .bool(self.source == DelegationSource::Cube)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegateOp {
    Delegate,
    Withdraw,
    /// Self-stake top-up after a max amount increase.
    Recharge,
}

impl DelegateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegateOp::Delegate => "delegate",
            DelegateOp::Withdraw => "withdraw",
            DelegateOp::Recharge => "recharge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateHistory {
    pub id: u64,
    pub delegator_address: Address,
    pub candidate_id: CandidateId,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    pub op: DelegateOp,
    pub block_height: BlockHeight,
}

impl Record for DelegateHistory {
    const TABLE: &'static str = "delegate_history";
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new()
            .u64(self.id)
            .address(&self.delegator_address)
            .u64(self.candidate_id)
            .amount(&self.amount)
            .str(self.op.as_str())
            .i64(self.block_height)
            .finish()
    }
}

/// Immutable audit record of a slashing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slash {
    pub id: u64,
    pub candidate_id: CandidateId,
    #[serde(with = "ratio_serde")]
    pub slash_ratio: Ratio,
    #[serde(with = "amount_serde")]
    pub slash_amount: Amount,
    pub reason: String,
    pub block_height: BlockHeight,
    pub created_at: i64,
}

impl Record for Slash {
    const TABLE: &'static str = "slashes";
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![("candidate", self.candidate_id.to_string())]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new()
            .u64(self.id)
            .u64(self.candidate_id)
            .ratio(&self.slash_ratio)
            .amount(&self.slash_amount)
            .str(&self.reason)
            .i64(self.block_height)
            .i64(self.created_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "PENDING",
            RequestState::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnstakeRequest {
    pub id: u64,
    pub delegator_address: Address,
    pub candidate_id: CandidateId,
    pub initiated_block_height: BlockHeight,
    pub performed_block_height: BlockHeight,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    pub state: RequestState,
}

impl Record for UnstakeRequest {
    const TABLE: &'static str = "unstake_requests";
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("state", self.state.as_str().to_string()),
            ("delegator", self.delegator_address.to_string()),
        ]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new()
            .u64(self.id)
            .address(&self.delegator_address)
            .u64(self.candidate_id)
            .i64(self.initiated_block_height)
            .i64(self.performed_block_height)
            .amount(&self.amount)
            .str(self.state.as_str())
            .finish()
    }
}

/// Daily snapshot of a candidate's shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDailyStake {
    pub id: u64,
    pub candidate_id: CandidateId,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    pub block_height: BlockHeight,
}

impl Record for CandidateDailyStake {
    const TABLE: &'static str = "candidate_daily_stakes";
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![("candidate", self.candidate_id.to_string())]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new()
            .u64(self.id)
            .u64(self.candidate_id)
            .amount(&self.amount)
            .i64(self.block_height)
            .finish()
    }
}

/// A pending hand-over of a candidacy to another account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAccountUpdateRequest {
    pub id: u64,
    pub candidate_id: CandidateId,
    pub from_address: Address,
    pub to_address: Address,
    pub created_block_height: BlockHeight,
    pub accepted_block_height: BlockHeight,
    pub state: RequestState,
}

impl Record for CandidateAccountUpdateRequest {
    const TABLE: &'static str = "candidate_account_update_requests";
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![("to", self.to_address.to_string())]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new()
            .u64(self.id)
            .u64(self.candidate_id)
            .address(&self.from_address)
            .address(&self.to_address)
            .i64(self.created_block_height)
            .i64(self.accepted_block_height)
            .str(self.state.as_str())
            .finish()
    }
}
