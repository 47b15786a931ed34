//! Validation and application of governance transactions.

use num_bigint::BigInt;
use num_traits::Signed;
use shared_types::{
    Address, Amount, BalanceView, BlockHeight, Hash, Ledger, Transfer, GOV_HOLD_ACCOUNT,
};
use tv_01_params::{check_param_type, Params};
use tv_04_staking::{CandidateState, StakingStore, TxContext, TxOutcome};

use super::{Effects, GovernanceService};
use crate::domain::{
    Expiry, GovTx, LibSpec, LibStatus, Proposal, ProposalDetail, ProposalResult, Vote,
};
use crate::errors::{GovResult, GovernanceError};

fn charged(gas: u64, params: &Params) -> TxOutcome {
    TxOutcome {
        gas_used: gas,
        gas_fee: BigInt::from(gas) * BigInt::from(params.gas_price),
    }
}

fn require_funds<L: BalanceView + ?Sized>(
    ledger: &L,
    address: &Address,
    needed: Amount,
) -> GovResult<()> {
    let available = ledger.balance(address);
    if available < needed {
        return Err(GovernanceError::InsufficientFunds { needed, available });
    }
    Ok(())
}

/// Resolves the requested expiry against the current block; the default is
/// `height + proposal_expire_period`.
fn resolve_expiry(
    expiry: &Expiry,
    ctx: &TxContext,
    params: &Params,
) -> GovResult<(Option<i64>, Option<BlockHeight>)> {
    match (expiry.timestamp, expiry.block_height) {
        (Some(_), Some(_)) => Err(GovernanceError::ExceedsExpiration),
        (None, Some(h)) if h <= ctx.height => Err(GovernanceError::InvalidExpireBlockHeight),
        (None, Some(h)) => Ok((None, Some(h))),
        (Some(t), None) if t <= ctx.block_time => Err(GovernanceError::InvalidExpireTimestamp),
        (Some(t), None) => Ok((Some(t), None)),
        (None, None) => {
            let period = i64::try_from(params.proposal_expire_period).unwrap_or(i64::MAX);
            Ok((None, Some(ctx.height.saturating_add(period))))
        }
    }
}

/// Checks a program action height against the notice period.
fn program_height(
    requested: Option<BlockHeight>,
    ctx: &TxContext,
    params: &Params,
) -> GovResult<BlockHeight> {
    let (_, height) = resolve_expiry(
        &Expiry {
            timestamp: None,
            block_height: requested,
        },
        ctx,
        params,
    )?;
    let height = height.unwrap_or(ctx.height);
    let notice = i64::try_from(params.min_program_notice_blocks).unwrap_or(i64::MAX);
    if height.saturating_sub(ctx.height) < notice {
        return Err(GovernanceError::ExpirationTooClose);
    }
    Ok(height)
}

fn check_lib(lib: &LibSpec) -> GovResult<()> {
    if lib.name.trim().is_empty() || lib.version.trim().is_empty() {
        return Err(GovernanceError::InvalidNewLib);
    }
    Ok(())
}

impl GovernanceService {
    pub(crate) fn validate<L: BalanceView + ?Sized>(
        &self,
        tx: &GovTx,
        ctx: &TxContext,
        staking: &StakingStore,
        params: &Params,
        ledger: &L,
    ) -> GovResult<TxOutcome> {
        if let GovTx::Vote {
            proposal_id,
            answer: _,
        } = tx
        {
            self.validate_vote(proposal_id, ctx, staking)?;
            return Ok(TxOutcome::default());
        }

        require_validator(staking, &ctx.sender, true)?;
        let outcome = match tx {
            GovTx::TransferFund {
                from,
                amount,
                expiry,
                ..
            } => {
                if from != &ctx.sender {
                    return Err(GovernanceError::Unauthorized(
                        "transfer_from must be the proposer",
                    ));
                }
                if !amount.is_positive() {
                    return Err(GovernanceError::InvalidAmount);
                }
                resolve_expiry(expiry, ctx, params)?;
                let outcome = charged(params.transfer_fund_proposal_gas, params);
                require_funds(ledger, from, amount + &outcome.gas_fee)?;
                return Ok(outcome);
            }
            GovTx::ChangeParam {
                name,
                value,
                expiry,
                ..
            } => {
                check_param_type(name, value)
                    .map_err(|e| GovernanceError::InvalidParameter(e.to_string()))?;
                resolve_expiry(expiry, ctx, params)?;
                charged(params.change_param_proposal_gas, params)
            }
            GovTx::DeployLibEni { lib, expiry, .. } => {
                check_lib(lib)?;
                resolve_expiry(expiry, ctx, params)?;
                if self.ongoing_lib(&lib.name) {
                    return Err(GovernanceError::OngoingLibFound(lib.name.clone()));
                }
                charged(params.deploy_libeni_proposal_gas, params)
            }
            GovTx::RetireProgram {
                retired_block_height,
                ..
            } => {
                program_height(*retired_block_height, ctx, params)?;
                if self.ongoing_retire() {
                    return Err(GovernanceError::OngoingRetiringFound);
                }
                charged(params.retire_program_proposal_gas, params)
            }
            GovTx::UpgradeProgram {
                lib,
                upgrade_block_height,
                ..
            } => {
                check_lib(lib)?;
                program_height(*upgrade_block_height, ctx, params)?;
                if self.ongoing_retire() {
                    return Err(GovernanceError::OngoingRetiringFound);
                }
                charged(params.upgrade_program_proposal_gas, params)
            }
            GovTx::Vote { .. } => TxOutcome::default(),
        };
        require_funds(ledger, &ctx.sender, outcome.gas_fee.clone())?;
        Ok(outcome)
    }

    fn validate_vote(
        &self,
        proposal_id: &str,
        ctx: &TxContext,
        staking: &StakingStore,
    ) -> GovResult<()> {
        require_validator(staking, &ctx.sender, false)?;
        let proposal = self
            .store
            .proposal(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;
        if !proposal.is_open() || proposal.is_expired_at(ctx.height, ctx.block_time) {
            return Err(GovernanceError::ProposalFinalized(proposal_id.to_string()));
        }
        if self.store.vote(proposal_id, &ctx.sender).is_some() {
            return Err(GovernanceError::DuplicateVote);
        }
        Ok(())
    }

    /// A deploy proposal for `name` that is still open or waiting to deploy.
    fn ongoing_lib(&self, name: &str) -> bool {
        self.store.proposals().any(|p| match &p.detail {
            ProposalDetail::DeployLibEni {
                name: n, status, ..
            } => n == name && matches!(status, LibStatus::Pending | LibStatus::Ready),
            _ => false,
        })
    }

    /// A retire proposal that is still open or already approved.
    fn ongoing_retire(&self) -> bool {
        self.store.proposals().any(|p| {
            matches!(p.detail, ProposalDetail::RetireProgram { .. })
                && (p.is_open() || p.result == Some(ProposalResult::Approved))
        })
    }

    pub(crate) fn apply<L: Ledger + ?Sized>(
        &mut self,
        tx: &GovTx,
        ctx: &TxContext,
        tx_hash: &Hash,
        staking: &StakingStore,
        fx: &mut Effects<'_, L>,
    ) -> GovResult<()> {
        let params = fx.registry.params().clone();
        let (detail, reason, expiry) = match tx {
            GovTx::Vote {
                proposal_id,
                answer,
            } => {
                let vote = Vote {
                    id: self.store.votes.next_id(),
                    proposal_id: proposal_id.clone(),
                    voter: ctx.sender,
                    answer: *answer,
                    block_height: ctx.height,
                    created_at: ctx.block_time,
                };
                self.store.votes.insert(vote)?;
                return self.tally(proposal_id, ctx.height, ctx.block_time, staking, fx);
            }
            GovTx::TransferFund {
                from,
                to,
                amount,
                reason,
                expiry,
            } => {
                fx.ledger
                    .defer_transfer(Transfer::new(*from, GOV_HOLD_ACCOUNT, amount.clone()));
                let detail = ProposalDetail::TransferFund {
                    from: *from,
                    to: *to,
                    amount: amount.clone(),
                };
                (detail, reason, resolve_expiry(expiry, ctx, &params)?)
            }
            GovTx::ChangeParam {
                name,
                value,
                reason,
                expiry,
            } => {
                let detail = ProposalDetail::ChangeParam {
                    name: name.clone(),
                    value: value.clone(),
                };
                (detail, reason, resolve_expiry(expiry, ctx, &params)?)
            }
            GovTx::DeployLibEni {
                lib,
                reason,
                expiry,
            } => {
                let detail = ProposalDetail::DeployLibEni {
                    name: lib.name.clone(),
                    version: lib.version.clone(),
                    file_url: lib.file_url.clone(),
                    md5: lib.md5.clone(),
                    status: LibStatus::Pending,
                };
                (detail, reason, resolve_expiry(expiry, ctx, &params)?)
            }
            GovTx::RetireProgram {
                preserved_validators,
                reason,
                retired_block_height,
            } => {
                let height = program_height(*retired_block_height, ctx, &params)?;
                let detail = ProposalDetail::RetireProgram {
                    preserved_validators: preserved_validators.clone(),
                };
                (detail, reason, (None, Some(height)))
            }
            GovTx::UpgradeProgram {
                lib,
                reason,
                upgrade_block_height,
            } => {
                let height = program_height(*upgrade_block_height, ctx, &params)?;
                let detail = ProposalDetail::UpgradeProgram {
                    name: lib.name.clone(),
                    version: lib.version.clone(),
                    file_url: lib.file_url.clone(),
                    md5: lib.md5.clone(),
                };
                (detail, reason, (None, Some(height)))
            }
        };

        let (expire_timestamp, expire_block_height) = expiry;
        let proposal = Proposal {
            id: tx_hash.to_hex(),
            proposer: ctx.sender,
            block_height: ctx.height,
            detail,
            reason: reason.clone(),
            expire_timestamp,
            expire_block_height,
            created_at: ctx.block_time,
            result: None,
            result_msg: String::new(),
            result_block_height: None,
            result_at: None,
        };
        self.store.proposals.insert(proposal)?;
        Ok(())
    }
}

/// Proposers additionally need a positive committed voting power.
fn require_validator(
    staking: &StakingStore,
    address: &Address,
    needs_power: bool,
) -> GovResult<()> {
    match staking.candidate_by_address(address) {
        Some(c)
            if c.state == CandidateState::Validator && (!needs_power || c.voting_power > 0) =>
        {
            Ok(())
        }
        _ => Err(GovernanceError::InvalidValidator),
    }
}
