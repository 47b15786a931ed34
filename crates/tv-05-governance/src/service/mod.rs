//! # Governance Service
//!
//! Owns the governance store. Proposals are created and voted on through
//! [`GovernanceService::deliver`]; expiry and deferred deployments are
//! handled by [`GovernanceService::end_block`].
//!
//! Voting weight is the committed voting power of the current Validators,
//! read from the staking store at the moment of each vote, so a tally always
//! reflects the sitting set.
//!
//! ```text
//! propose ──► open ──(Y > 2/3)──► Approved ──► effect
//!               │ ──(N > 1/3)──► Rejected  ──► refund
//!               └──(expiry)───► Expired | Rejected ──► refund
//! ```

mod handlers;
mod lifecycle;

pub use lifecycle::Tally;

use serde::Serialize;
use num_traits::Zero;
use shared_types::{
    Amount, BalanceView, BlockHeight, Hash, Ledger, PubKey, Transfer, MINT_ACCOUNT,
};
use tracing::debug;
use tv_01_params::{ParamRegistry, Params};
use tv_03_native_store::{BatchOperation, Journaled, KeyValueStore, StoreResult};
use tv_04_staking::{StakingStore, TxContext, TxOutcome};

use crate::domain::{GovTx, Proposal, ProposalDetail, ProposalResult, Vote};
use crate::errors::GovResult;
use crate::ports::ProgramControl;
use crate::store::{GovernanceSavepoint, GovernanceStore};

/// Everything an approved proposal may touch outside the governance store.
pub struct Effects<'a, L: Ledger + ?Sized> {
    pub registry: &'a mut ParamRegistry,
    pub program: &'a mut dyn ProgramControl,
    pub ledger: &'a mut L,
}

/// A proposal with its votes, as served by the query surface.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub votes: Vec<Vote>,
}

#[derive(Debug, Default)]
pub struct GovernanceService {
    store: GovernanceStore,
}

impl GovernanceService {
    pub fn new(store: GovernanceStore) -> Self {
        Self { store }
    }

    pub fn load<KV: KeyValueStore + ?Sized>(kv: &KV) -> StoreResult<Self> {
        Ok(Self::new(GovernanceStore::load(kv)?))
    }

    pub fn store(&self) -> &GovernanceStore {
        &self.store
    }

    /// Every proposal with its votes, ordered by proposal id.
    pub fn proposals(&self) -> Vec<ProposalView> {
        self.store
            .proposals()
            .map(|p| ProposalView {
                proposal: p.clone(),
                votes: self.store.votes_of(&p.id).into_iter().cloned().collect(),
            })
            .collect()
    }

    /// Consensus keys to keep when an approved retirement takes effect at
    /// `height`; `None` when nothing retires there.
    pub fn retiring_validators(&self, height: BlockHeight) -> Option<Vec<PubKey>> {
        self.store
            .proposals()
            .filter(|p| p.result == Some(ProposalResult::Approved))
            .filter(|p| p.expire_block_height == Some(height))
            .find_map(|p| match &p.detail {
                ProposalDetail::RetireProgram {
                    preserved_validators,
                } => Some(
                    preserved_validators
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(PubKey::new)
                        .collect(),
                ),
                _ => None,
            })
    }

    // =========================================================================
    // BLOCK TRANSACTION
    // =========================================================================

    pub fn savepoint(&self) -> GovernanceSavepoint {
        self.store.savepoint()
    }

    pub fn rollback_to(&mut self, savepoint: GovernanceSavepoint) {
        self.store.rollback_to(savepoint);
    }

    pub fn rollback(&mut self) {
        self.store.rollback();
    }

    pub fn commit_ops(&mut self) -> StoreResult<Vec<BatchOperation>> {
        self.store.commit_ops()
    }

    pub fn digest(&self) -> [u8; 32] {
        self.store.digest()
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Validates `tx` without mutating anything.
    pub fn check<L: BalanceView + ?Sized>(
        &self,
        tx: &GovTx,
        ctx: &TxContext,
        staking: &StakingStore,
        params: &Params,
        ledger: &L,
    ) -> GovResult<TxOutcome> {
        self.validate(tx, ctx, staking, params, ledger)
    }

    /// Validates and applies `tx`; `tx_hash` becomes the id of a new proposal.
    pub fn deliver<L: Ledger + ?Sized>(
        &mut self,
        tx: &GovTx,
        ctx: &TxContext,
        tx_hash: &Hash,
        staking: &StakingStore,
        fx: &mut Effects<'_, L>,
    ) -> GovResult<TxOutcome> {
        let params = fx.registry.params().clone();
        let outcome = self.validate(tx, ctx, staking, &params, &*fx.ledger)?;
        self.apply(tx, ctx, tx_hash, staking, fx)?;
        if outcome.gas_fee > Amount::zero() {
            fx.ledger.defer_transfer(Transfer::new(
                ctx.sender,
                MINT_ACCOUNT,
                outcome.gas_fee.clone(),
            ));
        }
        debug!(
            op = tx.op(),
            sender = %ctx.sender,
            height = ctx.height,
            gas = outcome.gas_used,
            "Governance tx delivered"
        );
        Ok(outcome)
    }
}
