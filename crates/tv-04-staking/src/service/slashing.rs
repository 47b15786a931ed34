//! Punishment of absent, byzantine and bad-proposer validators.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use shared_types::{
    mul_ratio_floor, Amount, BlockHeight, PubKey, Ratio, Transfer, TransferSink, HOLD_ACCOUNT,
    MINT_ACCOUNT,
};
use tracing::{info, warn};
use tv_01_params::Params;

use super::StakingService;
use crate::domain::{CandidateId, Delegation, Slash};
use crate::errors::{StakeError, StakeResult};

pub const ABSENT_REASON: &str = "Absent validator";
pub const BYZANTINE_REASON: &str = "Byzantine validator";
pub const BAD_PROPOSER_REASON: &str = "Bad block proposer";

impl StakingService {
    /// Updates the absence map with the validators that missed the last block.
    pub fn record_absences(&mut self, height: BlockHeight, absent: &[PubKey]) {
        for pk in absent {
            self.absent.add(pk.clone(), height);
        }
        self.absent.clear_stale(height);
    }

    /// Slashes every validator currently in the absence map.
    ///
    /// Returns the pub_keys deactivated in this call.
    pub fn punish_absent_validators<S: TransferSink + ?Sized>(
        &mut self,
        height: BlockHeight,
        params: &Params,
        ledger: &mut S,
    ) -> StakeResult<Vec<PubKey>> {
        let entries: Vec<(PubKey, i16)> = self
            .absent
            .iter()
            .map(|(pk, a)| (pk.clone(), a.count))
            .collect();

        let mut removed = Vec::new();
        for (pk, count) in entries {
            if count > params.max_slash_blocks {
                continue;
            }
            let Some(id) = self.store.candidate_by_pub_key(&pk).map(|c| c.id) else {
                continue;
            };
            self.slash_candidate(id, &params.slash_ratio, ABSENT_REASON, height, params, ledger)?;

            if count == params.max_slash_blocks {
                self.deactivate(id)?;
                info!(pub_key = %pk, count, "Absent validator removed");
                removed.push(pk);
            }
        }
        Ok(removed)
    }

    /// Slashes a validator reported by byzantine evidence.
    pub fn punish_byzantine<S: TransferSink + ?Sized>(
        &mut self,
        pub_key: &PubKey,
        height: BlockHeight,
        params: &Params,
        ledger: &mut S,
    ) -> StakeResult<Amount> {
        let Some(id) = self.store.candidate_by_pub_key(pub_key).map(|c| c.id) else {
            warn!(pub_key = %pub_key, "Evidence for an unknown validator ignored");
            return Ok(Amount::zero());
        };
        let amount =
            self.slash_candidate(id, &params.slash_ratio, BYZANTINE_REASON, height, params, ledger)?;
        info!(pub_key = %pub_key, amount = %amount, "Byzantine validator slashed");
        Ok(amount)
    }

    /// Slashes and deactivates the proposer of a block whose EVM commit failed.
    pub fn punish_bad_proposer<S: TransferSink + ?Sized>(
        &mut self,
        pub_key: &PubKey,
        height: BlockHeight,
        params: &Params,
        ledger: &mut S,
    ) -> StakeResult<Amount> {
        let Some(id) = self.store.candidate_by_pub_key(pub_key).map(|c| c.id) else {
            warn!(pub_key = %pub_key, "Bad proposer is not a candidate");
            return Ok(Amount::zero());
        };
        let blocks = Ratio::from_integer(BigInt::from(params.max_slash_blocks));
        let ratio = &params.slash_ratio * blocks;
        let amount =
            self.slash_candidate(id, &ratio, BAD_PROPOSER_REASON, height, params, ledger)?;
        self.deactivate(id)?;
        info!(pub_key = %pub_key, amount = %amount, "Bad proposer slashed");
        Ok(amount)
    }

    /// Reduces every delegation of `candidate_id` by `ratio` of its shares.
    ///
    /// The slashed total leaves the hold account for the mint account. With
    /// slashing disabled only the zero-amount audit row is written.
    fn slash_candidate<S: TransferSink + ?Sized>(
        &mut self,
        candidate_id: CandidateId,
        ratio: &Ratio,
        reason: &str,
        height: BlockHeight,
        params: &Params,
        ledger: &mut S,
    ) -> StakeResult<Amount> {
        let mut total = Amount::zero();
        if params.slash_enabled {
            let delegations: Vec<Delegation> = self
                .store
                .delegations_of_candidate(candidate_id)
                .into_iter()
                .filter(|d| d.shares().is_positive())
                .cloned()
                .collect();
            for mut d in delegations {
                let cut = mul_ratio_floor(&d.shares(), ratio);
                if cut.is_zero() {
                    continue;
                }
                d.slash_amount += &cut;
                total += cut;
                self.store.delegations.update(d)?;
            }
        }

        if total.is_positive() {
            let mut c = self
                .store
                .candidate(candidate_id)
                .cloned()
                .ok_or_else(|| StakeError::CandidateNotFound(candidate_id.to_string()))?;
            c.shares -= &total;
            self.store.candidates.update(c)?;
            ledger.defer_transfer(Transfer::new(HOLD_ACCOUNT, MINT_ACCOUNT, total.clone()));
        }
        self.write_slash(candidate_id, ratio.clone(), total.clone(), reason.to_string(), height)?;
        Ok(total)
    }

    fn write_slash(
        &mut self,
        candidate_id: CandidateId,
        slash_ratio: Ratio,
        slash_amount: Amount,
        reason: String,
        height: BlockHeight,
    ) -> StakeResult<()> {
        let row = Slash {
            id: self.store.slashes.next_id(),
            candidate_id,
            slash_ratio,
            slash_amount,
            reason,
            block_height: height,
            created_at: self.block_time,
        };
        self.store.slashes.insert(row)?;
        Ok(())
    }

    /// Marks a candidate inactive with no voting power.
    pub(crate) fn deactivate(&mut self, candidate_id: CandidateId) -> StakeResult<()> {
        let mut c = self
            .store
            .candidate(candidate_id)
            .cloned()
            .ok_or_else(|| StakeError::CandidateNotFound(candidate_id.to_string()))?;
        c.active = false;
        c.voting_power = 0;
        c.pending_voting_power = 0;
        self.store.candidates.update(c)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, MockLedger};
    use super::*;
    use crate::domain::{DeclareCandidacy, Delegate, Description, StakeTx};
    use shared_types::{ratio_from_ints, Address};

    fn setup() -> (StakingService, MockLedger, Params) {
        let params = Params {
            self_staking_ratio: ratio_from_ints(1, 10),
            slash_ratio: ratio_from_ints(1, 100),
            max_slash_blocks: 3,
            ..Params::default()
        };
        let mut svc = StakingService::default();
        let owner = Address([1; 20]);
        let mut ledger = MockLedger::with(&[(owner, BigInt::from(10u64).pow(24))]);
        ledger.balances.insert(Address([2; 20]), BigInt::from(10_000));
        let declare = StakeTx::DeclareCandidacy(DeclareCandidacy {
            pub_key: PubKey::from("pk-v"),
            max_amount: BigInt::from(100_000),
            comp_rate: ratio_from_ints(1, 5),
            description: Description::default(),
        });
        svc.deliver(&declare, &ctx(owner, 1), &params, &mut ledger).unwrap();
        let delegate = StakeTx::Delegate(Delegate {
            validator_address: owner,
            amount: BigInt::from(5_000),
            cube_batch: String::new(),
            sig: String::new(),
        });
        svc.deliver(&delegate, &ctx(Address([2; 20]), 1), &params, &mut ledger)
            .unwrap();
        ledger.settle();
        (svc, ledger, params)
    }

    fn candidate(svc: &StakingService) -> crate::domain::Candidate {
        svc.store().candidate_by_pub_key(&PubKey::from("pk-v")).unwrap().clone()
    }

    #[test]
    fn test_absent_three_blocks_deactivates() {
        let (mut svc, mut ledger, params) = setup();
        let pk = PubKey::from("pk-v");

        for h in 2..=4 {
            svc.record_absences(h, &[pk.clone()]);
            let removed = svc.punish_absent_validators(h, &params, &mut ledger).unwrap();
            assert_eq!(removed.is_empty(), h < 4);
        }
        let c = candidate(&svc);
        assert!(!c.active);
        assert_eq!(c.voting_power, 0);
        // 15_000 → 14_850 → 14_702 → 14_555 (per-delegation floors)
        assert_eq!(c.shares, BigInt::from(14_555));
        let rows = svc.store().slashes_of(c.id);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.reason == ABSENT_REASON));
        assert!(rows.iter().all(|r| r.slash_amount.is_positive()));
        assert_eq!(rows[2].block_height, 4);

        let burned: Amount = ledger
            .transfers
            .iter()
            .filter(|t| t.to == MINT_ACCOUNT)
            .map(|t| &t.amount)
            .sum();
        assert_eq!(burned, BigInt::from(445));

        svc.record_absences(5, &[pk.clone()]);
        assert!(svc.punish_absent_validators(5, &params, &mut ledger).unwrap().is_empty());
        assert_eq!(svc.store().slashes_of(c.id).len(), 3);
    }

    #[test]
    fn test_signing_again_resets_absence() {
        let (mut svc, mut ledger, params) = setup();
        let pk = PubKey::from("pk-v");
        svc.record_absences(2, &[pk.clone()]);
        svc.record_absences(3, &[]);
        assert!(svc.absent_validators().is_empty());
        svc.punish_absent_validators(3, &params, &mut ledger).unwrap();
        assert!(svc.store().slashes().next().is_none());
    }

    #[test]
    fn test_byzantine_slash_once() {
        let (mut svc, mut ledger, params) = setup();
        let amount = svc
            .punish_byzantine(&PubKey::from("pk-v"), 2, &params, &mut ledger)
            .unwrap();
        assert_eq!(amount, BigInt::from(150));
        let c = candidate(&svc);
        assert!(c.active);
        let rows = svc.store().slashes_of(c.id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reason, BYZANTINE_REASON);

        let d = svc.store().delegation(&Address([2; 20]), c.id).unwrap();
        assert_eq!(d.slash_amount, BigInt::from(50));
        assert_eq!(d.shares(), BigInt::from(4_950));

        let unknown = svc
            .punish_byzantine(&PubKey::from("nobody"), 2, &params, &mut ledger)
            .unwrap();
        assert!(unknown.is_zero());
    }

    #[test]
    fn test_dry_run_records_zero_rows() {
        let (mut svc, mut ledger, mut params) = setup();
        params.slash_enabled = false;
        svc.punish_byzantine(&PubKey::from("pk-v"), 2, &params, &mut ledger)
            .unwrap();
        let c = candidate(&svc);
        assert_eq!(c.shares, BigInt::from(15_000));
        assert_eq!(svc.store().slashes_of(c.id)[0].slash_amount, Amount::zero());
        assert!(ledger.transfers.is_empty());
    }

    #[test]
    fn test_bad_proposer_slashed_and_deactivated() {
        let (mut svc, mut ledger, params) = setup();
        let amount = svc
            .punish_bad_proposer(&PubKey::from("pk-v"), 2, &params, &mut ledger)
            .unwrap();
        assert_eq!(amount, BigInt::from(450));
        assert!(!candidate(&svc).active);
    }
}
