//! # Block Award
//!
//! Pure arithmetic of the hourly reward distribution:
//!
//! 1. **Subsidy**: `mintable(h) · inflation / 100 / blocks_per_year` where
//!    `mintable(h) = base · (1 + inflation/100)^⌊h / blocks_per_year⌋`.
//! 2. **Tier split**: each validator in a tier gets `⌊award · min(pct, cap)⌋`;
//!    the residue is handed out once more in proportion to uncapped stake.
//!    Anything left after the second pass stays undistributed.
//! 3. **Validator split**: the owner keeps its self-stake fraction plus the
//!    commission on everyone else's part; delegators share the rest by stake.
//!
//! All rounding is `floor`, so the credited total never exceeds the input.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use shared_types::{
    amount_serde, mul_ratio_floor, ratio_of, Address, Amount, BlockHeight, PubKey, Ratio,
};
use tv_01_params::BLOCKS_PER_YEAR;

use crate::domain::entities::CandidateId;
use crate::domain::voting_power::capped_percentage;

/// Native kv key of the award accumulator.
pub const AWARD_ACCUMULATOR_KEY: &[u8] = b"award/accumulated";

/// Native kv key of the last distribution's [`AwardInfo`] list.
pub const AWARD_INFO_KEY: &[u8] = b"award/info";

/// Mintable base of the first year: one billion tokens.
pub fn base_mintable() -> Amount {
    BigInt::from(10u8).pow(27)
}

/// Supply cap for the year containing `height`.
pub fn mintable_amount(height: BlockHeight, inflation_rate: i64) -> Amount {
    let year = u32::try_from(height.max(0) / BLOCKS_PER_YEAR as i64).unwrap_or(u32::MAX);
    let hundred = BigInt::from(100);
    let growth = BigInt::from(100 + inflation_rate.max(0));
    (base_mintable() * growth.pow(year)).div_floor(&hundred.pow(year))
}

/// Newly minted value for one block.
pub fn block_subsidy(height: BlockHeight, inflation_rate: i64) -> Amount {
    if inflation_rate <= 0 {
        return Amount::zero();
    }
    let per_year: Amount = mintable_amount(height, inflation_rate) * BigInt::from(inflation_rate) / 100;
    per_year.div_floor(&BigInt::from(BLOCKS_PER_YEAR))
}

/// One delegation taking part in a distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardDelegation {
    pub delegator: Address,
    pub shares: Amount,
    pub comp_rate: Ratio,
}

/// One validator taking part in a distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardValidator {
    pub candidate_id: CandidateId,
    pub pub_key: PubKey,
    pub owner: Address,
    pub state: String,
    pub shares: Amount,
    pub delegations: Vec<RewardDelegation>,
}

/// What one validator's delegations receive.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorAward {
    pub candidate_id: CandidateId,
    pub amount: Amount,
    /// Per delegator, owner included; sums to `amount`.
    pub credits: Vec<(Address, Amount)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardInfo {
    pub address: Address,
    pub pub_key: PubKey,
    pub state: String,
    #[serde(with = "amount_serde")]
    pub shares: Amount,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

/// Two-pass split of `award` across one tier; amounts in input order.
pub fn split_tier(validators: &[RewardValidator], award: &Amount, cap: &Ratio) -> Vec<Amount> {
    let total: Amount = validators.iter().map(|v| &v.shares).sum();
    if !total.is_positive() || !award.is_positive() {
        return vec![Amount::zero(); validators.len()];
    }

    let mut amounts: Vec<Amount> = validators
        .iter()
        .map(|v| mul_ratio_floor(award, &capped_percentage(&v.shares, &total, cap)))
        .collect();
    let given: Amount = amounts.iter().sum();
    let residue = award - given;

    if residue.is_positive() {
        for (amount, v) in amounts.iter_mut().zip(validators) {
            *amount += mul_ratio_floor(&residue, &ratio_of(&v.shares, &total));
        }
    }
    amounts
}

/// Splits one validator's award between its owner and its delegators.
pub fn split_validator(validator: &RewardValidator, award: &Amount) -> ValidatorAward {
    let mut credits: Vec<(Address, Amount)> = Vec::new();
    let staked: Amount = validator.delegations.iter().map(|d| &d.shares).sum();

    if staked.is_positive() && award.is_positive() {
        let self_stake: Amount = validator
            .delegations
            .iter()
            .filter(|d| d.delegator == validator.owner)
            .map(|d| &d.shares)
            .sum();
        let others = &staked - &self_stake;
        let owner_base = mul_ratio_floor(award, &ratio_of(&self_stake, &staked));
        let rest = award - &owner_base;

        let mut given = Amount::zero();
        if others.is_positive() {
            for d in validator
                .delegations
                .iter()
                .filter(|d| d.delegator != validator.owner)
            {
                let portion = mul_ratio_floor(&rest, &ratio_of(&d.shares, &others));
                let keep = mul_ratio_floor(&portion, &(Ratio::one() - &d.comp_rate));
                if keep.is_positive() {
                    given += &keep;
                    credits.push((d.delegator, keep));
                }
            }
        }
        credits.push((validator.owner, award - &given));
    }

    ValidatorAward {
        candidate_id: validator.candidate_id,
        amount: if credits.is_empty() { Amount::zero() } else { award.clone() },
        credits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::ratio_from_ints;

    fn validator(id: u64, owner: u8, stakes: &[(u8, i64)], comp: (i64, i64)) -> RewardValidator {
        let delegations: Vec<RewardDelegation> = stakes
            .iter()
            .map(|(who, s)| RewardDelegation {
                delegator: Address([*who; 20]),
                shares: BigInt::from(*s),
                comp_rate: ratio_from_ints(comp.0, comp.1),
            })
            .collect();
        RewardValidator {
            candidate_id: id,
            pub_key: PubKey::new(format!("pk{id}")),
            owner: Address([owner; 20]),
            state: "Validator".into(),
            shares: delegations.iter().map(|d| &d.shares).sum(),
            delegations,
        }
    }

    #[test]
    fn test_first_year_subsidy() {
        let yearly: BigInt = BigInt::from(8) * base_mintable() / 100;
        assert_eq!(block_subsidy(10, 8), yearly.div_floor(&BigInt::from(BLOCKS_PER_YEAR)));
        assert_eq!(block_subsidy(10, 0), Amount::zero());
    }

    #[test]
    fn test_mintable_compounds_yearly() {
        let second_year = BLOCKS_PER_YEAR as i64 + 1;
        assert_eq!(
            mintable_amount(second_year, 8),
            base_mintable() * 108 / 100
        );
    }

    #[test]
    fn test_single_validator_takes_all() {
        let v = vec![validator(1, 1, &[(1, 500)], (1, 5))];
        let amounts = split_tier(&v, &BigInt::from(1000), &ratio_from_ints(12, 100));
        assert_eq!(amounts, vec![BigInt::from(1000)]);
    }

    #[test]
    fn test_validator_split_commission() {
        // owner 100, delegator 300; award 400 → owner base 100, rest 300,
        // delegator keeps 300 · (1 − 1/5) = 240, owner gets 160.
        let v = validator(1, 1, &[(1, 100), (2, 300)], (1, 5));
        let award = split_validator(&v, &BigInt::from(400));
        assert_eq!(award.amount, BigInt::from(400));
        assert_eq!(
            award.credits,
            vec![
                (Address([2; 20]), BigInt::from(240)),
                (Address([1; 20]), BigInt::from(160))
            ]
        );
    }

    #[test]
    fn test_no_stake_no_credit() {
        let v = validator(1, 1, &[], (1, 5));
        let award = split_validator(&v, &BigInt::from(50));
        assert!(award.credits.is_empty());
        assert_eq!(award.amount, Amount::zero());
    }

    proptest! {
        #[test]
        fn prop_distribution_never_exceeds_award(
            stakes in prop::collection::vec(1i64..1_000_000, 1..8),
            award in 0i64..1_000_000_000,
        ) {
            let vals: Vec<RewardValidator> = stakes
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    validator(i as u64, i as u8, &[(i as u8, *s), (200, *s / 2 + 1)], (1, 3))
                })
                .collect();
            let award = BigInt::from(award);
            let amounts = split_tier(&vals, &award, &ratio_from_ints(12, 100));
            let given: Amount = amounts.iter().sum();
            prop_assert!(given <= award);
            prop_assert!(&award - &given < BigInt::from(vals.len() as i64));

            for (v, a) in vals.iter().zip(&amounts) {
                let split = split_validator(v, a);
                let credited: Amount = split.credits.iter().map(|(_, x)| x).sum();
                prop_assert_eq!(&credited, a);
            }
        }
    }
}
