//! Epoch recomputation of voting power and the validator set.

use std::collections::BTreeMap;

use num_traits::Signed;
use shared_types::{Amount, BlockHeight, PubKey};
use tracing::{debug, info};
use tv_01_params::Params;

use super::{StakingService, ValidatorUpdate};
use crate::domain::{
    delegation_voting_power, Candidate, CandidateFactors, CandidateId, CandidateState, Delegation,
};
use crate::errors::StakeResult;

impl StakingService {
    /// Current validators keyed by pub_key with their committed power.
    pub fn validator_powers(&self) -> BTreeMap<PubKey, i64> {
        self.store
            .candidates()
            .filter(|c| c.state == CandidateState::Validator)
            .map(|c| (c.pub_key.clone(), c.voting_power))
            .collect()
    }

    /// Recomputes every voting power, re-ranks the candidates and returns
    /// the change against the previous validator set.
    pub fn update_validator_set(
        &mut self,
        height: BlockHeight,
        params: &Params,
    ) -> StakeResult<Vec<ValidatorUpdate>> {
        let prior = self.validator_powers();

        let total_shares: Amount = self
            .store
            .candidates()
            .filter(|c| c.active && c.shares.is_positive())
            .map(|c| &c.shares)
            .sum();

        let candidates: Vec<Candidate> = self.store.candidates().cloned().collect();
        let mut ranking: Vec<(i64, PubKey, CandidateId)> = Vec::with_capacity(candidates.len());
        for c in &candidates {
            let vp = self.recompute_candidate_power(c, &total_shares, params)?;
            ranking.push((vp, c.pub_key.clone(), c.id));
        }
        // No stake has aged a day yet: active candidates keep their committed power.
        if ranking.iter().all(|(vp, _, _)| *vp == 0) {
            for (vp, _, id) in ranking.iter_mut() {
                if let Some(c) = self.store.candidate(*id) {
                    if c.active && c.shares.is_positive() {
                        *vp = c.voting_power;
                    }
                }
            }
        }
        ranking.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let max_vals = usize::from(params.max_vals);
        let backup_vals = usize::from(params.backup_vals);
        for (idx, (vp, _, id)) in ranking.iter().enumerate() {
            let state = if *vp > 0 && idx < max_vals {
                CandidateState::Validator
            } else if *vp > 0 && idx < max_vals + backup_vals {
                CandidateState::BackupValidator
            } else {
                CandidateState::Candidate
            };
            let rank = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            if let Some(current) = self.store.candidate(*id) {
                let mut c = current.clone();
                c.voting_power = *vp;
                c.pending_voting_power = *vp;
                c.state = state;
                c.rank = rank;
                if &c != current {
                    self.store.candidates.update(c)?;
                }
            }
        }

        let updates = diff_validator_sets(&prior, &self.validator_powers());
        if !updates.is_empty() {
            info!(height, changes = updates.len(), "Validator set changed");
        }
        Ok(updates)
    }

    fn recompute_candidate_power(
        &mut self,
        c: &Candidate,
        total_shares: &Amount,
        params: &Params,
    ) -> StakeResult<i64> {
        let delegations: Vec<Delegation> = self
            .store
            .delegations_of_candidate(c.id)
            .into_iter()
            .cloned()
            .collect();
        let ranked = c.active && c.shares.is_positive();
        let factors = ranked.then(|| {
            let daily: Vec<Amount> = self
                .store
                .daily_stakes_of(c.id)
                .into_iter()
                .map(|r| r.amount.clone())
                .collect();
            CandidateFactors::new(
                &c.shares,
                total_shares,
                &params.validator_size_threshold,
                &daily,
                c.num_of_delegators,
            )
        });

        let mut total: i64 = 0;
        for mut d in delegations {
            let vp = match &factors {
                Some(f) => delegation_voting_power(
                    f,
                    total_shares,
                    &d.shares(),
                    d.average_staking_date,
                    params.min_staking_amount,
                ),
                None => 0,
            };
            total = total.saturating_add(vp);
            if d.voting_power != vp {
                d.voting_power = vp;
                self.store.delegations.update(d)?;
            }
        }
        debug!(pub_key = %c.pub_key, voting_power = total, "Voting power computed");
        Ok(total)
    }

    /// Merges this block's key rotations with `epoch_updates`.
    ///
    /// An epoch update for a key overrides a rotation of the same key.
    pub fn end_block_validator_updates(
        &mut self,
        epoch_updates: Vec<ValidatorUpdate>,
    ) -> Vec<ValidatorUpdate> {
        let mut merged: BTreeMap<PubKey, i64> = BTreeMap::new();
        for u in self.key_rotations.drain(..).chain(epoch_updates) {
            merged.insert(u.pub_key, u.power);
        }
        merged
            .into_iter()
            .map(|(pk, power)| ValidatorUpdate::new(pk, power))
            .collect()
    }

    /// Removes every validator not in `preserved` from the consensus set.
    pub fn retire_validators(&mut self, preserved: &[PubKey]) -> StakeResult<Vec<ValidatorUpdate>> {
        let retiring: Vec<(CandidateId, PubKey)> = self
            .store
            .candidates()
            .filter(|c| c.state == CandidateState::Validator && !preserved.contains(&c.pub_key))
            .map(|c| (c.id, c.pub_key.clone()))
            .collect();

        let mut updates = Vec::with_capacity(retiring.len());
        for (id, pk) in retiring {
            self.deactivate(id)?;
            updates.push(ValidatorUpdate::new(pk, 0));
        }
        info!(retired = updates.len(), preserved = preserved.len(), "Validators retired");
        Ok(updates)
    }
}

/// Changed or new entries of `current`, plus power-0 removals from `prior`.
pub fn diff_validator_sets(
    prior: &BTreeMap<PubKey, i64>,
    current: &BTreeMap<PubKey, i64>,
) -> Vec<ValidatorUpdate> {
    let mut updates: Vec<ValidatorUpdate> = current
        .iter()
        .filter(|(pk, power)| prior.get(*pk) != Some(*power))
        .map(|(pk, power)| ValidatorUpdate::new(pk.clone(), *power))
        .collect();
    updates.extend(
        prior
            .keys()
            .filter(|pk| !current.contains_key(*pk))
            .map(|pk| ValidatorUpdate::new(pk.clone(), 0)),
    );
    updates.sort();
    updates
}
