//! Periodic EndBlock bookkeeping: unstake completion, staking age and
//! daily stake snapshots.

use num_traits::{Signed, Zero};
use shared_types::{Amount, BlockHeight, Transfer, TransferSink, HOLD_ACCOUNT};
use tracing::{debug, info, warn};
use tv_01_params::Params;

use super::StakingService;
use crate::domain::{CandidateDailyStake, CandidateId, CandidateState, Delegation, RequestState};
use crate::domain::voting_power::LONG_VELOCITY_WINDOW;
use crate::errors::StakeResult;

impl StakingService {
    /// Completes every PENDING unstake request due at `height`.
    ///
    /// Returns the number of requests completed.
    pub fn complete_unstake_requests<S: TransferSink + ?Sized>(
        &mut self,
        height: BlockHeight,
        ledger: &mut S,
    ) -> StakeResult<usize> {
        let due = self.store.due_unstake_requests(height);
        let completed = due.len();
        let mut touched: Vec<CandidateId> = Vec::new();

        for mut req in due {
            match self.store.delegation(&req.delegator_address, req.candidate_id).cloned() {
                Some(mut d) => {
                    d.pending_withdraw_amount -= &req.amount;
                    d.withdraw_amount += &req.amount;
                    self.release_delegation(d)?;
                }
                None => warn!(request = req.id, "Unstake request without delegation"),
            }

            if let Some(mut c) = self.store.candidate(req.candidate_id).cloned() {
                c.shares -= &req.amount;
                if c.shares.is_negative() {
                    c.shares = Amount::zero();
                }
                self.store.candidates.update(c)?;
            }

            ledger.defer_transfer(Transfer::new(
                HOLD_ACCOUNT,
                req.delegator_address,
                req.amount.clone(),
            ));
            debug!(
                request = req.id,
                delegator = %req.delegator_address,
                amount = %req.amount,
                "Unstake request completed"
            );
            touched.push(req.candidate_id);
            req.state = RequestState::Completed;
            self.store.unstake_requests.update(req)?;
        }

        touched.sort_unstable();
        touched.dedup();
        for id in touched {
            self.prune_candidate(id)?;
        }
        Ok(completed)
    }

    /// Updates `delegation`, or removes it once nothing is staked or pending.
    fn release_delegation(&mut self, delegation: Delegation) -> StakeResult<()> {
        if !delegation.shares().is_zero() || !delegation.pending_withdraw_amount.is_zero() {
            self.store.delegations.update(delegation)?;
            return Ok(());
        }
        self.store.delegations.remove(&delegation.id)?;
        if let Some(mut c) = self.store.candidate(delegation.candidate_id).cloned() {
            c.num_of_delegators = c.num_of_delegators.saturating_sub(1);
            self.store.candidates.update(c)?;
        }
        Ok(())
    }

    /// Removes a withdrawn candidate whose delegations are all released.
    fn prune_candidate(&mut self, id: CandidateId) -> StakeResult<()> {
        let Some(c) = self.store.candidate(id) else {
            return Ok(());
        };
        if !c.is_withdrawn() || c.state == CandidateState::Validator {
            return Ok(());
        }
        if !self.store.delegations_of_candidate(id).is_empty() {
            return Ok(());
        }
        let removed = self.store.candidates.remove(&id)?;
        info!(pub_key = %removed.pub_key, "Withdrawn candidate pruned");
        Ok(())
    }

    /// Ages every staked delegation by one day at the configured interval.
    pub fn accumulate_staking_dates(
        &mut self,
        height: BlockHeight,
        params: &Params,
    ) -> StakeResult<usize> {
        if !params.is_avg_staking_date_height(height) {
            return Ok(0);
        }
        let aged: Vec<Delegation> = self
            .store
            .delegations()
            .filter(|d| d.shares().is_positive())
            .cloned()
            .collect();
        let count = aged.len();
        for mut d in aged {
            d.average_staking_date = d.average_staking_date.saturating_add(1);
            self.store.delegations.update(d)?;
        }
        Ok(count)
    }

    /// Records each staked candidate's shares and drops expired snapshots.
    pub fn snapshot_daily_stakes(&mut self, height: BlockHeight, params: &Params) -> StakeResult<()> {
        if !params.is_stake_snapshot_height(height) {
            return Ok(());
        }
        let rows: Vec<(CandidateId, Amount)> = self
            .store
            .candidates()
            .filter(|c| c.shares.is_positive())
            .map(|c| (c.id, c.shares.clone()))
            .collect();
        for (candidate_id, amount) in rows {
            let row = CandidateDailyStake {
                id: self.store.daily_stakes.next_id(),
                candidate_id,
                amount,
                block_height: height,
            };
            self.store.daily_stakes.insert(row)?;
        }

        let window = i64::try_from(params.cal_stake_interval)
            .unwrap_or(i64::MAX)
            .saturating_mul(LONG_VELOCITY_WINDOW as i64);
        let cutoff = height.saturating_sub(window);
        let expired = self
            .store
            .daily_stakes
            .remove_where(|r| r.block_height <= cutoff);
        debug!(height, expired, "Daily stakes snapshotted");
        Ok(())
    }
}
