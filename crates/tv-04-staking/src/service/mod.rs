//! # Staking Service
//!
//! Owns the staking store and the absent-validator map, and exposes the
//! operations the lifecycle driver calls.
//!
//! ## Transaction paths
//!
//! - [`StakingService::check`] validates a tx against the current store and a
//!   read-only [`BalanceView`]. It never mutates.
//! - [`StakingService::deliver`] re-runs the same validation, then mutates
//!   the store and queues balance movements on a [`Ledger`]. The caller
//!   wraps it in a savepoint and rolls back on error.
//!
//! ## EndBlock duties
//!
//! | Step | Method |
//! |------|--------|
//! | absent and byzantine punishment | [`StakingService::punish_absent_validators`], [`StakingService::punish_byzantine`] |
//! | rewards (epoch) | [`StakingService::distribute_rewards`] |
//! | unstake completion | [`StakingService::complete_unstake_requests`] |
//! | staking-age and daily snapshot | [`StakingService::accumulate_staking_dates`], [`StakingService::snapshot_daily_stakes`] |
//! | validator-set diff | [`StakingService::end_block_validator_updates`] |

mod genesis;
mod handlers;
mod maintenance;
mod rewards;
mod slashing;
mod validator_set;

pub use slashing::{ABSENT_REASON, BAD_PROPOSER_REASON, BYZANTINE_REASON};
pub use validator_set::diff_validator_sets;

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, BalanceView, BlockHeight, Ledger, PubKey, Transfer, MINT_ACCOUNT};
use tracing::debug;
use tv_01_params::Params;
use tv_03_native_store::{BatchOperation, Journaled, KeyValueStore, StoreResult};

use crate::domain::{AbsentValidators, StakeTx};
use crate::errors::{StakeError, StakeResult};
use crate::store::{StakingSavepoint, StakingStore};

/// Who sent a tx and where it lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxContext {
    pub sender: Address,
    /// Native nonce the tx was signed with.
    pub nonce: u64,
    pub height: BlockHeight,
    /// Unix seconds of the block.
    pub block_time: i64,
}

/// Result of a successful check or deliver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxOutcome {
    pub gas_used: u64,
    /// `gas_used × gas_price`, burned from the sender on deliver.
    pub gas_fee: Amount,
}

impl TxOutcome {
    fn free() -> Self {
        Self::default()
    }

    fn charged(gas: u64, params: &Params) -> Self {
        Self {
            gas_used: gas,
            gas_fee: BigInt::from(gas) * BigInt::from(params.gas_price),
        }
    }
}

/// A validator power change for the consensus engine; power 0 removes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: PubKey,
    pub power: i64,
}

impl ValidatorUpdate {
    pub fn new(pub_key: PubKey, power: i64) -> Self {
        Self { pub_key, power }
    }
}

#[derive(Debug, Default)]
pub struct StakingService {
    store: StakingStore,
    absent: AbsentValidators,
    /// Consensus-key rotations of sitting validators made in this block.
    key_rotations: Vec<ValidatorUpdate>,
    /// Unix seconds of the block being executed.
    block_time: i64,
}

impl StakingService {
    pub fn new(store: StakingStore) -> Self {
        Self {
            store,
            absent: AbsentValidators::new(),
            key_rotations: Vec::new(),
            block_time: 0,
        }
    }

    /// Restores the tables persisted in `kv`.
    pub fn load<KV: KeyValueStore + ?Sized>(kv: &KV) -> StoreResult<Self> {
        Ok(Self::new(StakingStore::load(kv)?))
    }

    pub fn store(&self) -> &StakingStore {
        &self.store
    }

    pub fn absent_validators(&self) -> &AbsentValidators {
        &self.absent
    }

    pub fn set_absent_validators(&mut self, absent: AbsentValidators) {
        self.absent = absent;
    }

    // =========================================================================
    // BLOCK TRANSACTION
    // =========================================================================

    /// Clears per-block state.
    pub fn begin_block(&mut self, block_time: i64) {
        self.key_rotations.clear();
        self.block_time = block_time;
    }

    pub fn savepoint(&self) -> StakingSavepoint {
        self.store.savepoint()
    }

    pub fn rollback_to(&mut self, savepoint: StakingSavepoint) {
        self.store.rollback_to(savepoint);
    }

    /// Undoes every table change since the last commit.
    pub fn rollback(&mut self) {
        self.store.rollback();
        self.key_rotations.clear();
    }

    /// Batch persisting every table change since the last commit.
    pub fn commit_ops(&mut self) -> StoreResult<Vec<BatchOperation>> {
        self.store.commit_ops()
    }

    /// Digest of all staking tables.
    pub fn digest(&self) -> [u8; 32] {
        self.store.digest()
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Validates `tx` without mutating anything.
    pub fn check<L: BalanceView + ?Sized>(
        &self,
        tx: &StakeTx,
        ctx: &TxContext,
        params: &Params,
        ledger: &L,
    ) -> StakeResult<TxOutcome> {
        self.validate(tx, ctx, params, ledger).map(|plan| plan.outcome)
    }

    /// Validates and applies `tx`.
    pub fn deliver<L: Ledger + ?Sized>(
        &mut self,
        tx: &StakeTx,
        ctx: &TxContext,
        params: &Params,
        ledger: &mut L,
    ) -> StakeResult<TxOutcome> {
        let plan = self.validate(tx, ctx, params, &*ledger)?;
        self.apply(tx, ctx, params, &plan, ledger)?;
        if plan.outcome.gas_fee > Amount::zero() {
            ledger.defer_transfer(Transfer::new(
                ctx.sender,
                MINT_ACCOUNT,
                plan.outcome.gas_fee.clone(),
            ));
        }
        debug!(
            op = tx.op(),
            sender = %ctx.sender,
            height = ctx.height,
            gas = plan.outcome.gas_used,
            "Staking tx delivered"
        );
        Ok(plan.outcome)
    }

    pub(crate) fn candidate_or_err(
        &self,
        owner: &Address,
    ) -> StakeResult<&crate::domain::Candidate> {
        self.store
            .candidate_by_address(owner)
            .ok_or_else(|| StakeError::CandidateNotFound(owner.to_string()))
    }
}

/// Values computed during validation and reused when applying.
#[derive(Debug, Clone, Default)]
pub(crate) struct Plan {
    pub outcome: TxOutcome,
    /// Self-stake to lock (positive) or release (negative).
    pub stake_delta: Amount,
}
