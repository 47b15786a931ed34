use num_traits::ToPrimitive;
use shared_types::{wei_per_token, Amount, BlockHeight};
use tracing::info;
use tv_01_params::GenesisValidator;

use super::{StakingService, ValidatorUpdate};
use crate::domain::{
    Candidate, CandidateState, DelegateOp, Delegation, DelegationSource, Description,
};
use crate::errors::{StakeError, StakeResult};

impl StakingService {
    /// Seeds the genesis validators as sitting validators with a self
    /// delegation each.
    ///
    /// Returns the initial validator set and the total stake, which the
    /// caller must fund into the hold account.
    pub fn init_genesis(
        &mut self,
        validators: &[GenesisValidator],
        height: BlockHeight,
        block_time: i64,
    ) -> StakeResult<(Vec<ValidatorUpdate>, Amount)> {
        let mut updates = Vec::with_capacity(validators.len());
        let mut total = Amount::default();

        for (idx, v) in validators.iter().enumerate() {
            if self.store.candidate_by_address(&v.address).is_some() {
                return Err(StakeError::CandidateExists(v.address));
            }
            if self.store.candidate_by_pub_key(&v.pub_key).is_some() {
                return Err(StakeError::PubKeyExists(v.pub_key.clone()));
            }
            let power = (&v.shares / wei_per_token()).to_i64().unwrap_or(i64::MAX).max(1);

            let candidate = Candidate {
                id: self.store.candidates.next_id(),
                pub_key: v.pub_key.clone(),
                owner_address: v.address,
                shares: v.shares.clone(),
                voting_power: power,
                pending_voting_power: power,
                max_shares: v.max_amount.clone(),
                comp_rate: v.comp_rate.clone(),
                description: Description {
                    name: v.name.clone(),
                    ..Description::default()
                },
                verified: true,
                active: true,
                block_height: height,
                rank: u32::try_from(idx + 1).unwrap_or(u32::MAX),
                state: CandidateState::Validator,
                num_of_delegators: 1,
                created_at: block_time,
            };
            self.store.candidates.insert(candidate.clone())?;

            let mut delegation = Delegation::new(
                self.store.delegations.next_id(),
                v.address,
                &candidate,
                height,
                DelegationSource::Wallet,
            );
            delegation.delegate_amount = v.shares.clone();
            delegation.voting_power = power;
            self.store.delegations.insert(delegation)?;
            self.record_history(v.address, candidate.id, &v.shares, DelegateOp::Delegate, height)?;

            total += &v.shares;
            updates.push(ValidatorUpdate::new(v.pub_key.clone(), power));
        }

        updates.sort();
        info!(validators = updates.len(), stake = %total, "Genesis validators loaded");
        Ok((updates, total))
    }
}
