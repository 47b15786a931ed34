//! Per-transaction validation and mutation.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use shared_types::{
    is_open_unit_interval, mul_ratio_floor, Address, Amount, BalanceView, BlockHeight, Ledger,
    Transfer, HOLD_ACCOUNT,
};
use tracing::info;
use tv_01_params::Params;

use super::{Plan, StakingService, TxContext, TxOutcome, ValidatorUpdate};
use crate::domain::{
    verify_cube_signature, Candidate, CandidateAccountUpdateRequest, CandidateId, CandidateState,
    DelegateHistory, DelegateOp, Delegation, DelegationSource, Description, RequestState,
    StakeTx, UnstakeRequest,
};
use crate::errors::{StakeError, StakeResult};

fn require_funds<L: BalanceView + ?Sized>(
    ledger: &L,
    address: &Address,
    needed: Amount,
) -> StakeResult<()> {
    let available = ledger.balance(address);
    if available < needed {
        return Err(StakeError::InsufficientFunds { needed, available });
    }
    Ok(())
}

/// Copies every non-empty field of `update` into `current`; true if any changed.
fn merge_description(current: &mut Description, update: &Description) -> bool {
    let mut changed = false;
    for (field, value) in [
        (&mut current.name, &update.name),
        (&mut current.website, &update.website),
        (&mut current.location, &update.location),
        (&mut current.email, &update.email),
        (&mut current.profile, &update.profile),
    ] {
        if !value.is_empty() && field != value {
            *field = value.clone();
            changed = true;
        }
    }
    changed
}

impl StakingService {
    pub(crate) fn validate<L: BalanceView + ?Sized>(
        &self,
        tx: &StakeTx,
        ctx: &TxContext,
        params: &Params,
        ledger: &L,
    ) -> StakeResult<Plan> {
        let sender = &ctx.sender;
        match tx {
            StakeTx::DeclareCandidacy(d) => {
                if self.store.candidate_by_address(sender).is_some() {
                    return Err(StakeError::CandidateExists(*sender));
                }
                if self.store.candidate_by_pub_key(&d.pub_key).is_some() {
                    return Err(StakeError::PubKeyExists(d.pub_key.clone()));
                }
                if !d.max_amount.is_positive() {
                    return Err(StakeError::InvalidAmount);
                }
                if !is_open_unit_interval(&d.comp_rate) {
                    return Err(StakeError::InvalidCompRate);
                }
                let self_stake = mul_ratio_floor(&d.max_amount, &params.self_staking_ratio);
                if !self_stake.is_positive() {
                    return Err(StakeError::InvalidAmount);
                }
                let outcome = TxOutcome::charged(params.declare_candidacy_gas, params);
                require_funds(ledger, sender, &self_stake + &outcome.gas_fee)?;
                Ok(Plan {
                    outcome,
                    stake_delta: self_stake,
                })
            }

            StakeTx::UpdateCandidacy(u) => {
                let c = self.candidate_or_err(sender)?;
                if c.is_withdrawn() {
                    return Err(StakeError::CandidateWithdrawn);
                }
                if let Some(pk) = &u.pub_key {
                    if pk != &c.pub_key && self.store.candidate_by_pub_key(pk).is_some() {
                        return Err(StakeError::PubKeyExists(pk.clone()));
                    }
                }
                if let Some(rate) = &u.comp_rate {
                    if !is_open_unit_interval(rate) {
                        return Err(StakeError::InvalidCompRate);
                    }
                }
                let mut delta = Amount::zero();
                if let Some(max) = &u.max_amount {
                    if !max.is_positive() {
                        return Err(StakeError::InvalidAmount);
                    }
                    delta = mul_ratio_floor(max, &params.self_staking_ratio)
                        - c.self_staking_amount(&params.self_staking_ratio);
                    if &c.shares + &delta > *max {
                        return Err(StakeError::ReachMaxStake);
                    }
                    if delta.is_negative() {
                        let own = self
                            .store
                            .delegation(sender, c.id)
                            .map(Delegation::shares)
                            .unwrap_or_default();
                        if own < -delta.clone() {
                            return Err(StakeError::CandidateWithdrawalDisallowed);
                        }
                    }
                }
                let outcome = TxOutcome::charged(params.update_candidacy_gas, params);
                let lock = if delta.is_positive() { delta.clone() } else { Amount::zero() };
                require_funds(ledger, sender, lock + &outcome.gas_fee)?;
                Ok(Plan {
                    outcome,
                    stake_delta: delta,
                })
            }

            StakeTx::WithdrawCandidacy => {
                let c = self.candidate_or_err(sender)?;
                if c.is_withdrawn() {
                    return Err(StakeError::CandidateWithdrawn);
                }
                Ok(Plan::default())
            }

            StakeTx::VerifyCandidacy {
                candidate_address, ..
            } => {
                if sender != &params.foundation_address {
                    return Err(StakeError::VerificationDisallowed(*sender));
                }
                self.candidate_or_err(candidate_address)?;
                Ok(Plan::default())
            }

            StakeTx::ActivateCandidacy => {
                let c = self.candidate_or_err(sender)?;
                if c.is_withdrawn() {
                    return Err(StakeError::CandidateWithdrawn);
                }
                if c.active {
                    return Err(StakeError::CandidateAlreadyActivated);
                }
                Ok(Plan::default())
            }

            StakeTx::DeactivateCandidacy => {
                let c = self.candidate_or_err(sender)?;
                if !c.active {
                    return Err(StakeError::CandidateAlreadyDeactivated);
                }
                Ok(Plan::default())
            }

            StakeTx::Delegate(d) => {
                if !d.amount.is_positive() {
                    return Err(StakeError::InvalidAmount);
                }
                let c = self.candidate_or_err(&d.validator_address)?;
                if c.is_withdrawn() {
                    return Err(StakeError::CandidateWithdrawn);
                }
                let keys = params
                    .cube_pub_keys()
                    .map_err(|e| StakeError::CubeSignature(e.to_string()))?;
                if !keys.is_empty() {
                    verify_cube_signature(&keys, sender, ctx.nonce, &d.cube_batch, &d.sig)?;
                }
                if &c.shares + &d.amount > c.max_shares {
                    return Err(StakeError::ReachMaxStake);
                }
                require_funds(ledger, sender, d.amount.clone())?;
                Ok(Plan {
                    outcome: TxOutcome::free(),
                    stake_delta: d.amount.clone(),
                })
            }

            StakeTx::Withdraw {
                validator_address,
                amount,
            } => {
                if !amount.is_positive() {
                    return Err(StakeError::InvalidWithdrawalAmount);
                }
                let c = self.candidate_or_err(validator_address)?;
                let d = self
                    .store
                    .delegation(sender, c.id)
                    .ok_or(StakeError::DelegationNotFound)?;
                let shares = d.shares();
                if amount > &shares {
                    return Err(StakeError::InvalidWithdrawalAmount);
                }
                if sender == &c.owner_address && !c.is_withdrawn() {
                    let remaining = shares - amount;
                    if remaining < c.self_staking_amount(&params.self_staking_ratio) {
                        return Err(StakeError::CandidateWithdrawalDisallowed);
                    }
                }
                Ok(Plan::default())
            }

            StakeTx::SetCompRate {
                delegator_address,
                comp_rate,
            } => {
                let c = self.candidate_or_err(sender)?;
                if self.store.delegation(delegator_address, c.id).is_none() {
                    return Err(StakeError::DelegationNotFound);
                }
                if !is_open_unit_interval(comp_rate) || comp_rate > &c.comp_rate {
                    return Err(StakeError::InvalidCompRate);
                }
                let outcome = TxOutcome::charged(params.set_comp_rate_gas, params);
                require_funds(ledger, sender, outcome.gas_fee.clone())?;
                Ok(Plan {
                    outcome,
                    ..Plan::default()
                })
            }

            StakeTx::UpdateCandidacyAccount {
                new_candidate_account,
            } => {
                let c = self.candidate_or_err(sender)?;
                if c.is_withdrawn() {
                    return Err(StakeError::CandidateWithdrawn);
                }
                if new_candidate_account == sender {
                    return Err(StakeError::BadRequest("new account equals the current owner"));
                }
                if self.store.candidate_by_address(new_candidate_account).is_some() {
                    return Err(StakeError::CandidateExists(*new_candidate_account));
                }
                let outcome = TxOutcome::charged(params.update_candidacy_account_gas, params);
                require_funds(ledger, sender, outcome.gas_fee.clone())?;
                Ok(Plan {
                    outcome,
                    ..Plan::default()
                })
            }

            StakeTx::AcceptCandidacyAccountUpdate { request_id } => {
                let req = self
                    .store
                    .account_update_request(*request_id)
                    .ok_or(StakeError::BadRequest("account update request not found"))?;
                if req.state != RequestState::Pending {
                    return Err(StakeError::BadRequest("account update request already processed"));
                }
                if &req.to_address != sender {
                    return Err(StakeError::Unauthorized(
                        "account update request is addressed to another account",
                    ));
                }
                let c = self
                    .store
                    .candidate(req.candidate_id)
                    .ok_or_else(|| StakeError::CandidateNotFound(req.candidate_id.to_string()))?;
                if c.owner_address != req.from_address {
                    return Err(StakeError::BadRequest("candidate owner changed since the request"));
                }
                if self.store.candidate_by_address(sender).is_some() {
                    return Err(StakeError::CandidateExists(*sender));
                }
                if !self
                    .store
                    .pending_unstakes_of(&req.from_address, Some(c.id))
                    .is_empty()
                {
                    return Err(StakeError::PendingUnstakeRequests);
                }
                let self_stake = self
                    .store
                    .delegation(&req.from_address, c.id)
                    .map(Delegation::shares)
                    .unwrap_or_default();
                let outcome =
                    TxOutcome::charged(params.accept_candidacy_account_update_gas, params);
                require_funds(ledger, sender, &self_stake + &outcome.gas_fee)?;
                Ok(Plan {
                    outcome,
                    stake_delta: self_stake,
                })
            }
        }
    }

    pub(crate) fn apply<L: Ledger + ?Sized>(
        &mut self,
        tx: &StakeTx,
        ctx: &TxContext,
        params: &Params,
        plan: &Plan,
        ledger: &mut L,
    ) -> StakeResult<()> {
        let sender = ctx.sender;
        let height = ctx.height;
        match tx {
            StakeTx::DeclareCandidacy(d) => {
                let candidate = Candidate {
                    id: self.store.candidates.next_id(),
                    pub_key: d.pub_key.clone(),
                    owner_address: sender,
                    shares: plan.stake_delta.clone(),
                    voting_power: 0,
                    pending_voting_power: 0,
                    max_shares: d.max_amount.clone(),
                    comp_rate: d.comp_rate.clone(),
                    description: d.description.clone(),
                    verified: false,
                    active: true,
                    block_height: height,
                    rank: 0,
                    state: CandidateState::Candidate,
                    num_of_delegators: 1,
                    created_at: ctx.block_time,
                };
                self.store.candidates.insert(candidate.clone())?;

                let mut delegation = Delegation::new(
                    self.store.delegations.next_id(),
                    sender,
                    &candidate,
                    height,
                    DelegationSource::Wallet,
                );
                delegation.delegate_amount = plan.stake_delta.clone();
                self.store.delegations.insert(delegation)?;
                self.record_history(sender, candidate.id, &plan.stake_delta, DelegateOp::Delegate, height)?;
                ledger.defer_transfer(Transfer::new(sender, HOLD_ACCOUNT, plan.stake_delta.clone()));
                info!(
                    owner = %sender,
                    pub_key = %candidate.pub_key,
                    self_stake = %plan.stake_delta,
                    "Candidate declared"
                );
            }

            StakeTx::UpdateCandidacy(u) => {
                let mut c = self.candidate_or_err(&sender)?.clone();
                if let Some(pk) = &u.pub_key {
                    if pk != &c.pub_key {
                        if c.state == CandidateState::Validator && c.voting_power > 0 {
                            self.key_rotations
                                .push(ValidatorUpdate::new(c.pub_key.clone(), 0));
                            self.key_rotations
                                .push(ValidatorUpdate::new(pk.clone(), c.voting_power));
                        }
                        info!(old = %c.pub_key, new = %pk, "Candidate consensus key rotated");
                        c.pub_key = pk.clone();
                    }
                }
                if let Some(max) = &u.max_amount {
                    c.max_shares = max.clone();
                    let delta = &plan.stake_delta;
                    if !delta.is_zero() {
                        let (mut own, is_new) =
                            self.delegation_or_new(sender, &c, height, DelegationSource::Wallet);
                        if delta.is_positive() {
                            own.delegate_amount += delta;
                            self.record_history(sender, c.id, delta, DelegateOp::Recharge, height)?;
                            ledger.defer_transfer(Transfer::new(sender, HOLD_ACCOUNT, delta.clone()));
                        } else {
                            let refund = -delta.clone();
                            own.withdraw_amount += &refund;
                            self.record_history(sender, c.id, &refund, DelegateOp::Withdraw, height)?;
                            ledger.defer_transfer(Transfer::new(HOLD_ACCOUNT, sender, refund));
                        }
                        if is_new {
                            c.num_of_delegators += 1;
                        }
                        self.save_delegation(own, is_new)?;
                        c.shares += delta;
                    }
                }
                if let Some(rate) = &u.comp_rate {
                    c.comp_rate = rate.clone();
                }
                if merge_description(&mut c.description, &u.description) {
                    c.verified = false;
                }
                self.store.candidates.update(c)?;
            }

            StakeTx::WithdrawCandidacy => {
                let mut c = self.candidate_or_err(&sender)?.clone();
                let delegations: Vec<Delegation> = self
                    .store
                    .delegations_of_candidate(c.id)
                    .into_iter()
                    .cloned()
                    .collect();
                for mut d in delegations {
                    let shares = d.shares();
                    if !shares.is_positive() {
                        continue;
                    }
                    self.open_unstake_request(&mut d, shares.clone(), height, params)?;
                    self.record_history(d.delegator_address, c.id, &shares, DelegateOp::Withdraw, height)?;
                    self.store.delegations.update(d)?;
                }
                c.shares = Amount::zero();
                c.active = false;
                info!(owner = %sender, pub_key = %c.pub_key, "Candidacy withdrawn");
                self.store.candidates.update(c)?;
            }

            StakeTx::VerifyCandidacy {
                candidate_address,
                verified,
            } => {
                let mut c = self.candidate_or_err(candidate_address)?.clone();
                c.verified = *verified;
                self.store.candidates.update(c)?;
            }

            StakeTx::ActivateCandidacy | StakeTx::DeactivateCandidacy => {
                let mut c = self.candidate_or_err(&sender)?.clone();
                c.active = matches!(tx, StakeTx::ActivateCandidacy);
                info!(pub_key = %c.pub_key, active = c.active, "Candidate activation changed");
                self.store.candidates.update(c)?;
            }

            StakeTx::Delegate(d) => {
                let mut c = self.candidate_or_err(&d.validator_address)?.clone();
                let source = if d.sig.is_empty() {
                    DelegationSource::Wallet
                } else {
                    DelegationSource::Cube
                };
                let (mut delegation, is_new) = self.delegation_or_new(sender, &c, height, source);
                let old = delegation.shares();
                if old.is_positive() {
                    let weighted = BigInt::from(delegation.average_staking_date) * &old
                        / (&old + &d.amount);
                    delegation.average_staking_date = weighted.to_i64().unwrap_or(0);
                }
                delegation.delegate_amount += &d.amount;
                self.save_delegation(delegation, is_new)?;

                c.shares += &d.amount;
                if is_new {
                    c.num_of_delegators += 1;
                }
                let cid = c.id;
                self.store.candidates.update(c)?;
                self.record_history(sender, cid, &d.amount, DelegateOp::Delegate, height)?;
                ledger.defer_transfer(Transfer::new(sender, HOLD_ACCOUNT, d.amount.clone()));
            }

            StakeTx::Withdraw {
                validator_address,
                amount,
            } => {
                let cid = self.candidate_or_err(validator_address)?.id;
                let mut d = self
                    .store
                    .delegation(&sender, cid)
                    .cloned()
                    .ok_or(StakeError::DelegationNotFound)?;
                self.open_unstake_request(&mut d, amount.clone(), height, params)?;
                self.store.delegations.update(d)?;
                self.record_history(sender, cid, amount, DelegateOp::Withdraw, height)?;
            }

            StakeTx::SetCompRate {
                delegator_address,
                comp_rate,
            } => {
                let cid = self.candidate_or_err(&sender)?.id;
                let mut d = self
                    .store
                    .delegation(delegator_address, cid)
                    .cloned()
                    .ok_or(StakeError::DelegationNotFound)?;
                d.comp_rate = comp_rate.clone();
                self.store.delegations.update(d)?;
            }

            StakeTx::UpdateCandidacyAccount {
                new_candidate_account,
            } => {
                let cid = self.candidate_or_err(&sender)?.id;
                let request = CandidateAccountUpdateRequest {
                    id: self.store.account_updates.next_id(),
                    candidate_id: cid,
                    from_address: sender,
                    to_address: *new_candidate_account,
                    created_block_height: height,
                    accepted_block_height: 0,
                    state: RequestState::Pending,
                };
                self.store.account_updates.insert(request)?;
            }

            StakeTx::AcceptCandidacyAccountUpdate { request_id } => {
                let mut req = self
                    .store
                    .account_update_request(*request_id)
                    .cloned()
                    .ok_or(StakeError::BadRequest("account update request not found"))?;
                let mut c = self
                    .store
                    .candidate(req.candidate_id)
                    .cloned()
                    .ok_or_else(|| StakeError::CandidateNotFound(req.candidate_id.to_string()))?;
                let self_stake = &plan.stake_delta;

                if self_stake.is_positive() {
                    if let Some(mut old) = self.store.delegation(&req.from_address, c.id).cloned() {
                        old.withdraw_amount += self_stake;
                        if old.shares().is_zero() && old.pending_withdraw_amount.is_zero() {
                            self.store.delegations.remove(&old.id)?;
                            c.num_of_delegators = c.num_of_delegators.saturating_sub(1);
                        } else {
                            self.store.delegations.update(old)?;
                        }
                    }
                    self.record_history(req.from_address, c.id, self_stake, DelegateOp::Withdraw, height)?;
                    ledger.defer_transfer(Transfer::new(
                        HOLD_ACCOUNT,
                        req.from_address,
                        self_stake.clone(),
                    ));

                    let (mut own, is_new) =
                        self.delegation_or_new(sender, &c, height, DelegationSource::Wallet);
                    own.delegate_amount += self_stake;
                    if is_new {
                        c.num_of_delegators += 1;
                    }
                    self.save_delegation(own, is_new)?;
                    self.record_history(sender, c.id, self_stake, DelegateOp::Delegate, height)?;
                    ledger.defer_transfer(Transfer::new(sender, HOLD_ACCOUNT, self_stake.clone()));
                }

                info!(
                    pub_key = %c.pub_key,
                    from = %req.from_address,
                    to = %sender,
                    "Candidate account transferred"
                );
                c.owner_address = sender;
                self.store.candidates.update(c)?;
                req.state = RequestState::Completed;
                req.accepted_block_height = height;
                self.store.account_updates.update(req)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // ROW HELPERS
    // =========================================================================

    pub(crate) fn record_history(
        &mut self,
        delegator: Address,
        candidate_id: CandidateId,
        amount: &Amount,
        op: DelegateOp,
        height: BlockHeight,
    ) -> StakeResult<()> {
        let row = DelegateHistory {
            id: self.store.history.next_id(),
            delegator_address: delegator,
            candidate_id,
            amount: amount.clone(),
            op,
            block_height: height,
        };
        self.store.history.insert(row)?;
        Ok(())
    }

    /// The delegation of `delegator` in `candidate`, or a fresh one.
    pub(crate) fn delegation_or_new(
        &mut self,
        delegator: Address,
        candidate: &Candidate,
        height: BlockHeight,
        source: DelegationSource,
    ) -> (Delegation, bool) {
        match self.store.delegation(&delegator, candidate.id) {
            Some(d) => (d.clone(), false),
            None => {
                let id = self.store.delegations.next_id();
                (Delegation::new(id, delegator, candidate, height, source), true)
            }
        }
    }

    pub(crate) fn save_delegation(&mut self, delegation: Delegation, is_new: bool) -> StakeResult<()> {
        if is_new {
            self.store.delegations.insert(delegation)?;
        } else {
            self.store.delegations.update(delegation)?;
        }
        Ok(())
    }

    /// Moves `amount` of `delegation` into a new PENDING unstake request.
    fn open_unstake_request(
        &mut self,
        delegation: &mut Delegation,
        amount: Amount,
        height: BlockHeight,
        params: &Params,
    ) -> StakeResult<()> {
        let waiting = i64::try_from(params.unstake_waiting_period).unwrap_or(i64::MAX);
        let request = UnstakeRequest {
            id: self.store.unstake_requests.next_id(),
            delegator_address: delegation.delegator_address,
            candidate_id: delegation.candidate_id,
            initiated_block_height: height,
            performed_block_height: height.saturating_add(waiting),
            amount: amount.clone(),
            state: RequestState::Pending,
        };
        self.store.unstake_requests.insert(request)?;
        delegation.pending_withdraw_amount += amount;
        if delegation.shares().is_zero() {
            delegation.average_staking_date = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, MockLedger};
    use super::*;
    use crate::domain::cube::test_support::TestCube;
    use crate::domain::tx::{DeclareCandidacy, Delegate, UpdateCandidacy};
    use shared_types::{ratio_from_ints, ErrorCode, HasErrorCode, PubKey, MINT_ACCOUNT};

    fn e18(n: i64) -> Amount {
        BigInt::from(n) * BigInt::from(10u64).pow(18)
    }

    fn params() -> Params {
        Params {
            self_staking_ratio: ratio_from_ints(1, 10),
            unstake_waiting_period: 4,
            ..Params::default()
        }
    }

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    fn declare(pk: &str, max: Amount) -> StakeTx {
        StakeTx::DeclareCandidacy(DeclareCandidacy {
            pub_key: PubKey::from(pk),
            max_amount: max,
            comp_rate: ratio_from_ints(1, 5),
            description: Description {
                name: "node".into(),
                ..Description::default()
            },
        })
    }

    fn delegate(to: Address, amount: Amount) -> StakeTx {
        StakeTx::Delegate(Delegate {
            validator_address: to,
            amount,
            cube_batch: String::new(),
            sig: String::new(),
        })
    }

    /// A declared at height 1 with max 1000 tokens; balances settled.
    fn declared() -> (StakingService, MockLedger, Params) {
        let p = params();
        let mut svc = StakingService::default();
        let mut ledger = MockLedger::with(&[(addr(1), e18(10_000)), (addr(2), e18(1_000))]);
        svc.deliver(&declare("pk-a", e18(1_000)), &ctx(addr(1), 1), &p, &mut ledger)
            .unwrap();
        ledger.settle();
        (svc, ledger, p)
    }

    #[test]
    fn test_declare_locks_self_stake_and_burns_gas() {
        let (svc, ledger, p) = declared();
        let gas_fee = BigInt::from(p.declare_candidacy_gas) * BigInt::from(p.gas_price);
        assert_eq!(ledger.balances[&addr(1)], e18(10_000) - e18(100) - &gas_fee);
        assert_eq!(ledger.balances[&HOLD_ACCOUNT], e18(100));

        let c = svc.store().candidate_by_address(&addr(1)).unwrap();
        assert_eq!(c.shares, e18(100));
        assert_eq!(c.max_shares, e18(1_000));
        assert!(c.active);
        assert!(!c.verified);
        let d = svc.store().delegation(&addr(1), c.id).unwrap();
        assert_eq!(d.delegate_amount, e18(100));
        assert_eq!(d.award_amount, Amount::zero());
    }

    #[test]
    fn test_declare_duplicates_rejected() {
        let (svc, ledger, p) = declared();
        let again = svc.check(&declare("pk-b", e18(10)), &ctx(addr(1), 2), &p, &ledger);
        assert!(matches!(again, Err(StakeError::CandidateExists(_))));
        let same_key = svc.check(&declare("pk-a", e18(10)), &ctx(addr(2), 2), &p, &ledger);
        assert_eq!(same_key.unwrap_err().code(), ErrorCode::CandidateExists);
    }

    #[test]
    fn test_declare_needs_funds_and_valid_rate() {
        let p = params();
        let svc = StakingService::default();
        let ledger = MockLedger::with(&[(addr(1), e18(1))]);
        let err = svc
            .check(&declare("pk", e18(1_000)), &ctx(addr(1), 1), &p, &ledger)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientFunds);

        let bad_rate = StakeTx::DeclareCandidacy(DeclareCandidacy {
            pub_key: PubKey::from("pk"),
            max_amount: e18(1),
            comp_rate: ratio_from_ints(1, 1),
            description: Description::default(),
        });
        assert_eq!(
            svc.check(&bad_rate, &ctx(addr(1), 1), &p, &ledger).unwrap_err(),
            StakeError::InvalidCompRate
        );
    }

    #[test]
    fn test_delegate_then_withdraw_waits() {
        let (mut svc, mut ledger, p) = declared();
        svc.deliver(&delegate(addr(1), e18(500)), &ctx(addr(2), 2), &p, &mut ledger)
            .unwrap();
        ledger.settle();
        assert_eq!(ledger.balances[&addr(2)], e18(500));
        let c = svc.store().candidate_by_address(&addr(1)).unwrap().clone();
        assert_eq!(c.shares, e18(600));
        assert_eq!(c.num_of_delegators, 2);

        let withdraw = StakeTx::Withdraw {
            validator_address: addr(1),
            amount: e18(200),
        };
        svc.deliver(&withdraw, &ctx(addr(2), 3), &p, &mut ledger).unwrap();
        let d = svc.store().delegation(&addr(2), c.id).unwrap();
        assert_eq!(d.pending_withdraw_amount, e18(200));
        assert_eq!(d.shares(), e18(300));
        assert_eq!(svc.store().candidate(c.id).unwrap().shares, e18(600));
        let req = svc.store().pending_unstakes_of(&addr(2), None)[0].clone();
        assert_eq!(req.performed_block_height, 7);
        assert!(ledger.transfers.is_empty());
    }

    #[test]
    fn test_delegate_respects_max_and_cube_keys() {
        let (svc, ledger, mut p) = declared();
        let over = svc.check(&delegate(addr(1), e18(901)), &ctx(addr(2), 2), &p, &ledger);
        assert_eq!(over.unwrap_err(), StakeError::ReachMaxStake);

        let cube = TestCube::new("01");
        p.cube_pub_keys = serde_json::to_string(&vec![cube.key.clone()]).unwrap();
        let unsigned = svc.check(&delegate(addr(1), e18(1)), &ctx(addr(2), 2), &p, &ledger);
        assert_eq!(unsigned.unwrap_err().code(), ErrorCode::CubeSignatureInvalid);

        let mut c = ctx(addr(2), 2);
        c.nonce = 9;
        let signed = StakeTx::Delegate(Delegate {
            validator_address: addr(1),
            amount: e18(1),
            cube_batch: "01".into(),
            sig: cube.sign(&addr(2), 9),
        });
        svc.check(&signed, &c, &p, &ledger).unwrap();
    }

    #[test]
    fn test_owner_cannot_break_self_stake_floor() {
        let (svc, ledger, p) = declared();
        let withdraw = StakeTx::Withdraw {
            validator_address: addr(1),
            amount: e18(1),
        };
        assert_eq!(
            svc.check(&withdraw, &ctx(addr(1), 2), &p, &ledger).unwrap_err(),
            StakeError::CandidateWithdrawalDisallowed
        );
        let stranger = svc.check(&withdraw, &ctx(addr(3), 2), &p, &ledger);
        assert_eq!(stranger.unwrap_err(), StakeError::DelegationNotFound);
    }

    #[test]
    fn test_withdraw_candidacy_unstakes_everyone() {
        let (mut svc, mut ledger, p) = declared();
        svc.deliver(&delegate(addr(1), e18(50)), &ctx(addr(2), 2), &p, &mut ledger)
            .unwrap();
        ledger.settle();
        svc.deliver(&StakeTx::WithdrawCandidacy, &ctx(addr(1), 3), &p, &mut ledger)
            .unwrap();

        let c = svc.store().candidate_by_address(&addr(1)).unwrap();
        assert_eq!(c.shares, Amount::zero());
        assert!(!c.active);
        assert_eq!(svc.store().unstake_requests().count(), 2);
        for d in svc.store().delegations_of_candidate(c.id) {
            assert_eq!(d.shares(), Amount::zero());
        }
        let again = svc.check(&StakeTx::ActivateCandidacy, &ctx(addr(1), 4), &p, &ledger);
        assert_eq!(again.unwrap_err(), StakeError::CandidateWithdrawn);
    }

    #[test]
    fn test_update_candidacy_recharges_and_clears_verified() {
        let (mut svc, mut ledger, mut p) = declared();
        p.foundation_address = addr(9);
        let verify = StakeTx::VerifyCandidacy {
            candidate_address: addr(1),
            verified: true,
        };
        assert_eq!(
            svc.check(&verify, &ctx(addr(1), 2), &p, &ledger).unwrap_err(),
            StakeError::VerificationDisallowed(addr(1))
        );
        svc.deliver(&verify, &ctx(addr(9), 2), &p, &mut ledger).unwrap();

        let update = StakeTx::UpdateCandidacy(UpdateCandidacy {
            pub_key: None,
            max_amount: Some(e18(2_000)),
            comp_rate: None,
            description: Description {
                website: "https://node.example".into(),
                ..Description::default()
            },
        });
        svc.deliver(&update, &ctx(addr(1), 3), &p, &mut ledger).unwrap();
        let c = svc.store().candidate_by_address(&addr(1)).unwrap();
        assert_eq!(c.shares, e18(200));
        assert_eq!(c.max_shares, e18(2_000));
        assert!(!c.verified);
        assert_eq!(c.description.name, "node");
        assert!(ledger
            .transfers
            .iter()
            .any(|t| t.to == HOLD_ACCOUNT && t.amount == e18(100)));
        assert!(ledger.transfers.iter().any(|t| t.to == MINT_ACCOUNT));
    }

    #[test]
    fn test_key_rotation_of_validator_is_queued() {
        let (mut svc, mut ledger, p) = declared();
        let mut c = svc.store().candidate_by_address(&addr(1)).unwrap().clone();
        c.state = CandidateState::Validator;
        c.voting_power = 7;
        svc.store.candidates.update(c).unwrap();

        let rotate = StakeTx::UpdateCandidacy(UpdateCandidacy {
            pub_key: Some(PubKey::from("pk-new")),
            max_amount: None,
            comp_rate: None,
            description: Description::default(),
        });
        svc.deliver(&rotate, &ctx(addr(1), 2), &p, &mut ledger).unwrap();
        assert_eq!(
            svc.key_rotations,
            vec![
                ValidatorUpdate::new(PubKey::from("pk-a"), 0),
                ValidatorUpdate::new(PubKey::from("pk-new"), 7)
            ]
        );
    }

    #[test]
    fn test_set_comp_rate_bounded_by_candidate_rate() {
        let (mut svc, mut ledger, p) = declared();
        svc.deliver(&delegate(addr(1), e18(10)), &ctx(addr(2), 2), &p, &mut ledger)
            .unwrap();
        let too_high = StakeTx::SetCompRate {
            delegator_address: addr(2),
            comp_rate: ratio_from_ints(1, 2),
        };
        assert_eq!(
            svc.check(&too_high, &ctx(addr(1), 3), &p, &ledger).unwrap_err(),
            StakeError::InvalidCompRate
        );
        let ok = StakeTx::SetCompRate {
            delegator_address: addr(2),
            comp_rate: ratio_from_ints(1, 10),
        };
        svc.deliver(&ok, &ctx(addr(1), 3), &p, &mut ledger).unwrap();
        let cid = svc.store().candidate_by_address(&addr(1)).unwrap().id;
        assert_eq!(
            svc.store().delegation(&addr(2), cid).unwrap().comp_rate,
            ratio_from_ints(1, 10)
        );
    }

    #[test]
    fn test_account_update_moves_self_stake() {
        let (mut svc, mut ledger, p) = declared();
        ledger.balances.insert(addr(3), e18(1_000));
        let request = StakeTx::UpdateCandidacyAccount {
            new_candidate_account: addr(3),
        };
        svc.deliver(&request, &ctx(addr(1), 2), &p, &mut ledger).unwrap();
        ledger.settle();

        let accept = StakeTx::AcceptCandidacyAccountUpdate { request_id: 1 };
        assert_eq!(
            svc.check(&accept, &ctx(addr(2), 3), &p, &ledger).unwrap_err().code(),
            ErrorCode::Unauthorized
        );
        svc.deliver(&accept, &ctx(addr(3), 3), &p, &mut ledger).unwrap();
        ledger.settle();

        let c = svc.store().candidate_by_address(&addr(3)).unwrap();
        assert_eq!(c.shares, e18(100));
        assert_eq!(c.num_of_delegators, 1);
        assert!(svc.store().delegation(&addr(1), c.id).is_none());
        assert_eq!(svc.store().delegation(&addr(3), c.id).unwrap().shares(), e18(100));
        assert_eq!(ledger.balances[&HOLD_ACCOUNT], e18(100));
        assert!(svc.store().candidate_by_address(&addr(1)).is_none());
        assert!(svc.check(&accept, &ctx(addr(3), 4), &p, &ledger).is_err());
    }

    #[test]
    fn test_activation_toggles() {
        let (mut svc, mut ledger, p) = declared();
        assert_eq!(
            svc.check(&StakeTx::ActivateCandidacy, &ctx(addr(1), 2), &p, &ledger)
                .unwrap_err(),
            StakeError::CandidateAlreadyActivated
        );
        svc.deliver(&StakeTx::DeactivateCandidacy, &ctx(addr(1), 2), &p, &mut ledger)
            .unwrap();
        assert_eq!(
            svc.check(&StakeTx::DeactivateCandidacy, &ctx(addr(1), 3), &p, &ledger)
                .unwrap_err(),
            StakeError::CandidateAlreadyDeactivated
        );
        svc.deliver(&StakeTx::ActivateCandidacy, &ctx(addr(1), 3), &p, &mut ledger)
            .unwrap();
        assert!(svc.store().candidate_by_address(&addr(1)).unwrap().active);
    }
}
