//! Epoch reward distribution.

use num_traits::{One, Signed, Zero};
use shared_types::{
    mul_ratio_floor, Amount, BlockHeight, Ratio, Transfer, TransferSink, HOLD_ACCOUNT,
    MINT_ACCOUNT,
};
use tracing::{debug, info};
use tv_01_params::Params;

use super::StakingService;
use crate::domain::{
    split_tier, split_validator, AwardInfo, Candidate, CandidateState, DelegationSource,
    RewardDelegation, RewardValidator,
};
use crate::errors::{StakeError, StakeResult};

impl StakingService {
    /// Distributes `accumulated` over the present validators and backups.
    ///
    /// Returns the amount actually credited (never more than `accumulated`)
    /// and one [`AwardInfo`] per rewarded candidate.
    pub fn distribute_rewards<S: TransferSink + ?Sized>(
        &mut self,
        height: BlockHeight,
        accumulated: &Amount,
        params: &Params,
        ledger: &mut S,
    ) -> StakeResult<(Amount, Vec<AwardInfo>)> {
        if !accumulated.is_positive() {
            return Ok((Amount::zero(), Vec::new()));
        }

        let validators = self.reward_tier(CandidateState::Validator);
        let backups = self.reward_tier(CandidateState::BackupValidator);
        let ratio = if backups.is_empty() {
            Ratio::one()
        } else {
            params.validators_block_award_ratio.clone()
        };
        let validators_award = mul_ratio_floor(accumulated, &ratio);
        let backups_award = accumulated - &validators_award;

        let mut distributed = Amount::zero();
        let mut infos = Vec::new();
        for (tier, award) in [(validators, validators_award), (backups, backups_award)] {
            if tier.is_empty() {
                continue;
            }
            let amounts = split_tier(&tier, &award, &params.validator_size_threshold);
            for (v, amount) in tier.iter().zip(amounts) {
                let credited = self.credit_validator(v, &amount, height)?;
                if credited.is_zero() {
                    continue;
                }
                distributed += &credited;
                infos.push(AwardInfo {
                    address: v.owner,
                    pub_key: v.pub_key.clone(),
                    state: v.state.clone(),
                    shares: v.shares.clone(),
                    amount: credited,
                });
            }
        }

        if distributed.is_positive() {
            ledger.defer_transfer(Transfer::new(MINT_ACCOUNT, HOLD_ACCOUNT, distributed.clone()));
        }
        info!(
            height,
            accumulated = %accumulated,
            distributed = %distributed,
            recipients = infos.len(),
            "Block awards distributed"
        );
        Ok((distributed, infos))
    }

    /// Present members of one tier: active, staked and not absent.
    fn reward_tier(&self, state: CandidateState) -> Vec<RewardValidator> {
        self.store
            .candidates()
            .filter(|c| c.state == state && c.active && c.shares.is_positive())
            .filter(|c| !self.absent.contains(&c.pub_key))
            .map(|c| self.reward_validator(c))
            .collect()
    }

    fn reward_validator(&self, c: &Candidate) -> RewardValidator {
        let delegations = self
            .store
            .delegations_of_candidate(c.id)
            .into_iter()
            .filter(|d| d.shares().is_positive())
            .map(|d| RewardDelegation {
                delegator: d.delegator_address,
                shares: d.shares(),
                comp_rate: d.comp_rate.clone(),
            })
            .collect();
        RewardValidator {
            candidate_id: c.id,
            pub_key: c.pub_key.clone(),
            owner: c.owner_address,
            state: c.state.as_str().to_string(),
            shares: c.shares.clone(),
            delegations,
        }
    }

    /// Credits one validator's award into its delegations' `award_amount`.
    ///
    /// The credit stops at `max_shares`; whatever does not fit is left out
    /// of the returned amount and stays in the accumulator.
    fn credit_validator(
        &mut self,
        validator: &RewardValidator,
        award: &Amount,
        height: BlockHeight,
    ) -> StakeResult<Amount> {
        let mut c = self
            .store
            .candidate(validator.candidate_id)
            .cloned()
            .ok_or_else(|| StakeError::CandidateNotFound(validator.candidate_id.to_string()))?;
        let room = &c.max_shares - &c.shares;
        if !room.is_positive() {
            debug!(pub_key = %c.pub_key, "Validator at max shares, award withheld");
            return Ok(Amount::zero());
        }
        let award = if award > &room { &room } else { award };

        let split = split_validator(validator, award);
        if split.credits.is_empty() {
            return Ok(Amount::zero());
        }

        let mut credited = Amount::zero();
        for (delegator, amount) in split.credits {
            if !amount.is_positive() {
                continue;
            }
            let (mut d, is_new) =
                self.delegation_or_new(delegator, &c, height, DelegationSource::Wallet);
            d.award_amount += &amount;
            self.save_delegation(d, is_new)?;
            if is_new {
                c.num_of_delegators += 1;
            }
            credited += amount;
        }
        c.shares += &credited;
        debug!(pub_key = %c.pub_key, amount = %credited, "Validator awarded");
        self.store.candidates.update(c)?;
        Ok(credited)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, MockLedger};
    use super::*;
    use crate::domain::{DeclareCandidacy, Delegate, Description, StakeTx};
    use num_bigint::BigInt;
    use shared_types::{ratio_from_ints, Address, PubKey};

    fn params() -> Params {
        Params {
            self_staking_ratio: ratio_from_ints(1, 10),
            validator_size_threshold: ratio_from_ints(1, 1),
            validators_block_award_ratio: ratio_from_ints(9, 10),
            ..Params::default()
        }
    }

    fn declare(svc: &mut StakingService, ledger: &mut MockLedger, owner: u8, max: i64) {
        let tx = StakeTx::DeclareCandidacy(DeclareCandidacy {
            pub_key: PubKey::new(format!("pk{owner}")),
            max_amount: BigInt::from(max),
            comp_rate: ratio_from_ints(1, 5),
            description: Description::default(),
        });
        svc.deliver(&tx, &ctx(Address([owner; 20]), 1), &params(), ledger)
            .unwrap();
    }

    fn set_state(svc: &mut StakingService, owner: u8, state: CandidateState) {
        let mut c = svc
            .store()
            .candidate_by_address(&Address([owner; 20]))
            .unwrap()
            .clone();
        c.state = state;
        svc.store.candidates.update(c).unwrap();
    }

    fn setup() -> (StakingService, MockLedger) {
        let mut svc = StakingService::default();
        let rich = BigInt::from(10u64).pow(24);
        let mut ledger = MockLedger::with(&[
            (Address([1; 20]), rich.clone()),
            (Address([2; 20]), rich.clone()),
            (Address([3; 20]), rich),
        ]);
        declare(&mut svc, &mut ledger, 1, 10_000);
        declare(&mut svc, &mut ledger, 2, 10_000);
        set_state(&mut svc, 1, CandidateState::Validator);
        set_state(&mut svc, 2, CandidateState::BackupValidator);
        ledger.settle();
        (svc, ledger)
    }

    #[test]
    fn test_tiers_split_ninety_ten() {
        let (mut svc, mut ledger) = setup();
        let (given, infos) = svc
            .distribute_rewards(360, &BigInt::from(1_000), &params(), &mut ledger)
            .unwrap();
        assert_eq!(given, BigInt::from(1_000));
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].amount, BigInt::from(900));
        assert_eq!(infos[0].state, "Validator");
        assert_eq!(infos[1].amount, BigInt::from(100));
        assert_eq!(infos[1].state, "Backup Validator");

        let v = svc.store().candidate_by_address(&Address([1; 20])).unwrap();
        assert_eq!(v.shares, BigInt::from(1_900));
        let d = svc.store().delegation(&Address([1; 20]), v.id).unwrap();
        assert_eq!(d.award_amount, BigInt::from(900));

        assert_eq!(ledger.transfers.len(), 1);
        assert_eq!(ledger.transfers[0].from, MINT_ACCOUNT);
        assert_eq!(ledger.transfers[0].to, HOLD_ACCOUNT);
    }

    #[test]
    fn test_all_to_validators_without_backups() {
        let (mut svc, mut ledger) = setup();
        set_state(&mut svc, 2, CandidateState::Candidate);
        let (given, infos) = svc
            .distribute_rewards(360, &BigInt::from(1_000), &params(), &mut ledger)
            .unwrap();
        assert_eq!(given, BigInt::from(1_000));
        assert_eq!(infos.len(), 1);
    }

    #[test]
    fn test_absent_and_inactive_validators_skipped() {
        let (mut svc, mut ledger) = setup();
        svc.record_absences(360, &[PubKey::from("pk1")]);
        let (given, infos) = svc
            .distribute_rewards(360, &BigInt::from(1_000), &params(), &mut ledger)
            .unwrap();
        assert_eq!(given, BigInt::from(100));
        assert_eq!(infos[0].pub_key, PubKey::from("pk2"));
    }

    #[test]
    fn test_award_stops_at_max_shares() {
        let (mut svc, mut ledger) = setup();
        set_state(&mut svc, 2, CandidateState::Candidate);
        let p = params();
        declare(&mut svc, &mut ledger, 3, 1_000);
        set_state(&mut svc, 1, CandidateState::Candidate);
        set_state(&mut svc, 3, CandidateState::Validator);

        let (given, infos) = svc
            .distribute_rewards(360, &BigInt::from(5_000), &p, &mut ledger)
            .unwrap();
        let c = svc.store().candidate_by_address(&Address([3; 20])).unwrap();
        assert_eq!(c.shares, c.max_shares);
        assert_eq!(given, BigInt::from(900));
        assert_eq!(infos[0].amount, BigInt::from(900));
        let own = svc.store().delegation(&Address([3; 20]), c.id).unwrap();
        assert_eq!(own.shares(), c.shares);

        let (again, infos) = svc
            .distribute_rewards(720, &BigInt::from(5_000), &p, &mut ledger)
            .unwrap();
        assert!(again.is_zero());
        assert!(infos.is_empty());
    }

    #[test]
    fn test_delegators_paid_net_of_commission() {
        let (mut svc, mut ledger) = setup();
        let delegate = StakeTx::Delegate(Delegate {
            validator_address: Address([1; 20]),
            amount: BigInt::from(3_000),
            cube_batch: String::new(),
            sig: String::new(),
        });
        svc.deliver(&delegate, &ctx(Address([3; 20]), 2), &params(), &mut ledger)
            .unwrap();
        set_state(&mut svc, 2, CandidateState::Candidate);

        svc.distribute_rewards(360, &BigInt::from(4_000), &params(), &mut ledger)
            .unwrap();
        let v = svc.store().candidate_by_address(&Address([1; 20])).unwrap();
        let own = svc.store().delegation(&Address([1; 20]), v.id).unwrap();
        let other = svc.store().delegation(&Address([3; 20]), v.id).unwrap();
        assert_eq!(other.award_amount, BigInt::from(2_400));
        assert_eq!(own.award_amount, BigInt::from(1_600));
        assert_eq!(v.shares, BigInt::from(8_000));
    }
}
