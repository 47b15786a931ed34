//! Tallying, finalization and the EndBlock duties of governance.

use std::collections::BTreeMap;

use shared_types::{Address, BlockHeight, Ledger, Transfer, GOV_HOLD_ACCOUNT};
use tracing::{info, warn};
use tv_04_staking::{CandidateState, StakingStore};

use super::{Effects, GovernanceService};
use crate::domain::{LibSpec, LibStatus, ProposalDetail, ProposalResult, VoteAnswer};
use crate::errors::{GovResult, GovernanceError};

/// Voting power behind one proposal, counted over the sitting Validators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub yes: i64,
    pub no: i64,
    pub total: i64,
}

impl Tally {
    pub fn approved(&self) -> bool {
        self.total > 0 && i128::from(self.yes) * 3 > i128::from(self.total) * 2
    }

    pub fn rejected(&self) -> bool {
        self.total > 0 && i128::from(self.no) * 3 > i128::from(self.total)
    }

    /// At least two thirds of the power took part.
    pub fn quorum(&self) -> bool {
        let voted = i128::from(self.yes) + i128::from(self.no);
        self.total > 0 && voted * 3 >= i128::from(self.total) * 2
    }
}

impl GovernanceService {
    pub fn tally_votes(&self, proposal_id: &str, staking: &StakingStore) -> Tally {
        let powers: BTreeMap<Address, i64> = staking
            .candidates()
            .filter(|c| c.state == CandidateState::Validator)
            .map(|c| (c.owner_address, c.voting_power))
            .collect();
        let mut tally = Tally {
            total: powers.values().sum(),
            ..Tally::default()
        };
        for vote in self.store.votes_of(proposal_id) {
            let Some(power) = powers.get(&vote.voter) else {
                continue;
            };
            match vote.answer {
                VoteAnswer::Yes => tally.yes += power,
                VoteAnswer::No => tally.no += power,
            }
        }
        tally
    }

    /// Finalizes `proposal_id` once the votes decide it.
    pub(crate) fn tally<L: Ledger + ?Sized>(
        &mut self,
        proposal_id: &str,
        height: BlockHeight,
        block_time: i64,
        staking: &StakingStore,
        fx: &mut Effects<'_, L>,
    ) -> GovResult<()> {
        let tally = self.tally_votes(proposal_id, staking);
        if tally.approved() {
            self.finalize(
                proposal_id,
                ProposalResult::Approved,
                "Approved by validators".to_string(),
                height,
                block_time,
                fx,
            )
        } else if tally.rejected() {
            self.finalize(
                proposal_id,
                ProposalResult::Rejected,
                "Rejected by validators".to_string(),
                height,
                block_time,
                fx,
            )
        } else {
            Ok(())
        }
    }

    fn finalize<L: Ledger + ?Sized>(
        &mut self,
        proposal_id: &str,
        result: ProposalResult,
        msg: String,
        height: BlockHeight,
        block_time: i64,
        fx: &mut Effects<'_, L>,
    ) -> GovResult<()> {
        let mut p = self
            .store
            .proposal(proposal_id)
            .cloned()
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;
        if !p.is_open() {
            return Err(GovernanceError::ProposalFinalized(proposal_id.to_string()));
        }
        p.result = Some(result);
        p.result_msg = msg;
        p.result_block_height = Some(height);
        p.result_at = Some(block_time);

        let approved = result == ProposalResult::Approved;
        let action_height = p.expire_block_height.unwrap_or(height);
        match &mut p.detail {
            ProposalDetail::TransferFund { from, to, amount } => {
                let payee = if approved { *to } else { *from };
                fx.ledger
                    .defer_transfer(Transfer::new(GOV_HOLD_ACCOUNT, payee, amount.clone()));
            }
            ProposalDetail::ChangeParam { name, value } if approved => {
                if let Err(e) = fx.registry.set_param(name, value) {
                    warn!(
                        proposal = proposal_id,
                        param = %name,
                        error = %e,
                        "Parameter change not applied"
                    );
                    p.result_msg = format!("Approved, not applied: {e}");
                }
            }
            ProposalDetail::DeployLibEni { status, .. } => {
                *status = if approved {
                    LibStatus::Ready
                } else {
                    LibStatus::Cancelled
                };
            }
            ProposalDetail::RetireProgram { .. } if approved => {
                fx.program.schedule_retire(action_height);
            }
            ProposalDetail::UpgradeProgram {
                name,
                version,
                file_url,
                md5,
            } if approved => {
                let lib = LibSpec {
                    name: name.clone(),
                    version: version.clone(),
                    file_url: file_url.clone(),
                    md5: md5.clone(),
                };
                fx.program.schedule_upgrade(&lib, action_height);
            }
            _ => {}
        }

        info!(
            proposal = proposal_id,
            kind = p.detail.kind(),
            result = result.as_str(),
            height,
            "Proposal finalized"
        );
        self.store.proposals.update(p)?;
        Ok(())
    }

    /// Closes every open proposal past its expiry and deploys approved
    /// libraries that reached their deployment point.
    ///
    /// Returns the ids of the proposals closed here.
    pub fn end_block<L: Ledger + ?Sized>(
        &mut self,
        height: BlockHeight,
        block_time: i64,
        staking: &StakingStore,
        fx: &mut Effects<'_, L>,
    ) -> GovResult<Vec<String>> {
        let expired: Vec<String> = self
            .store
            .open_proposals()
            .into_iter()
            .filter(|p| p.is_expired_at(height, block_time))
            .map(|p| p.id.clone())
            .collect();

        for id in &expired {
            let tally = self.tally_votes(id, staking);
            let (result, msg) = if tally.quorum() {
                (ProposalResult::Rejected, "Not approved before expiry")
            } else {
                (ProposalResult::Expired, "Expired")
            };
            self.finalize(id, result, msg.to_string(), height, block_time, fx)?;
        }

        self.deploy_ready_libs(height, block_time, fx)?;
        Ok(expired)
    }

    fn deploy_ready_libs<L: Ledger + ?Sized>(
        &mut self,
        height: BlockHeight,
        block_time: i64,
        fx: &mut Effects<'_, L>,
    ) -> GovResult<()> {
        let due: Vec<_> = self
            .store
            .proposals()
            .filter(|p| p.is_expired_at(height, block_time))
            .filter(|p| {
                matches!(
                    p.detail,
                    ProposalDetail::DeployLibEni {
                        status: LibStatus::Ready,
                        ..
                    }
                )
            })
            .cloned()
            .collect();

        for mut p in due {
            if let ProposalDetail::DeployLibEni {
                name,
                version,
                file_url,
                md5,
                status,
            } = &mut p.detail
            {
                let lib = LibSpec {
                    name: name.clone(),
                    version: version.clone(),
                    file_url: file_url.clone(),
                    md5: md5.clone(),
                };
                fx.program.deploy_lib(&lib, height);
                *status = LibStatus::Deployed;
                info!(lib = %lib.name, version = %lib.version, height, "ENI library deployed");
            }
            self.store.proposals.update(p)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ctx, seated_validators, tx_hash, validator_address, MockLedger};
    use super::*;
    use crate::domain::{Expiry, GovTx};
    use crate::ports::{ProgramEvent, RecordingProgramControl};
    use num_bigint::BigInt;
    use proptest::prelude::*;
    use shared_types::PubKey;
    use tv_01_params::{ParamRegistry, Params};
    use tv_04_staking::TxOutcome;

    struct Harness {
        svc: GovernanceService,
        staking: StakingStore,
        registry: ParamRegistry,
        program: RecordingProgramControl,
        ledger: MockLedger,
    }

    impl Harness {
        fn new() -> Self {
            let params = Params {
                gas_price: 1,
                transfer_fund_proposal_gas: 10,
                change_param_proposal_gas: 10,
                deploy_libeni_proposal_gas: 10,
                retire_program_proposal_gas: 10,
                upgrade_program_proposal_gas: 10,
                proposal_expire_period: 100,
                min_program_notice_blocks: 10,
                ..Params::default()
            };
            Self {
                svc: GovernanceService::default(),
                staking: seated_validators(),
                registry: ParamRegistry::new(params),
                program: RecordingProgramControl::new(),
                ledger: MockLedger::with(&[
                    (validator_address(1), BigInt::from(1_000)),
                    (validator_address(2), BigInt::from(1_000)),
                ]),
            }
        }

        fn deliver(
            &mut self,
            tx: &GovTx,
            sender: u8,
            height: BlockHeight,
            hash: u8,
        ) -> GovResult<TxOutcome> {
            let mut fx = Effects {
                registry: &mut self.registry,
                program: &mut self.program,
                ledger: &mut self.ledger,
            };
            self.svc.deliver(
                tx,
                &ctx(validator_address(sender), height),
                &tx_hash(hash),
                &self.staking,
                &mut fx,
            )
        }

        fn vote(
            &mut self,
            hash: u8,
            voter: u8,
            answer: VoteAnswer,
            height: BlockHeight,
        ) -> GovResult<TxOutcome> {
            let tx = GovTx::Vote {
                proposal_id: tx_hash(hash).to_hex(),
                answer,
            };
            self.deliver(&tx, voter, height, 0xf0 + voter)
        }

        fn end_block(&mut self, height: BlockHeight) -> Vec<String> {
            let mut fx = Effects {
                registry: &mut self.registry,
                program: &mut self.program,
                ledger: &mut self.ledger,
            };
            let time = ctx(Address::ZERO, height).block_time;
            self.svc.end_block(height, time, &self.staking, &mut fx).unwrap()
        }

        fn result(&self, hash: u8) -> Option<ProposalResult> {
            self.svc.store().proposal(&tx_hash(hash).to_hex()).unwrap().result
        }
    }

    fn change_gas_price(expire: Option<BlockHeight>) -> GovTx {
        GovTx::ChangeParam {
            name: "gas_price".into(),
            value: "5".into(),
            reason: String::new(),
            expiry: Expiry {
                timestamp: None,
                block_height: expire,
            },
        }
    }

    fn lib_tx(kind: &str, height: BlockHeight) -> GovTx {
        let data = serde_json::json!({
            "name": "reverse", "version": "v1.0.0", "file_url": "{}", "md5": "{}",
            "deploy_block_height": height, "upgrade_block_height": height
        });
        GovTx::decode(kind, &data).unwrap()
    }

    #[test]
    fn test_tally_thresholds() {
        let t = Tally { yes: 200, no: 0, total: 300 };
        assert!(!t.approved());
        assert!(t.quorum());
        assert!(Tally { yes: 201, no: 0, total: 300 }.approved());
        assert!(!Tally { yes: 0, no: 100, total: 300 }.rejected());
        assert!(Tally { yes: 0, no: 101, total: 300 }.rejected());
        assert!(!Tally::default().approved());
    }

    #[test]
    fn test_two_thirds_yes_applies_param_change() {
        let mut h = Harness::new();
        h.deliver(&change_gas_price(None), 1, 1, 0x01).unwrap();
        h.vote(0x01, 1, VoteAnswer::Yes, 2).unwrap();
        assert_eq!(h.result(0x01), None);
        assert!(!h.registry.is_dirty());

        h.vote(0x01, 2, VoteAnswer::Yes, 2).unwrap();
        assert_eq!(h.result(0x01), Some(ProposalResult::Approved));
        assert_eq!(h.registry.params().gas_price, 5);
        assert!(h.registry.is_dirty());

        let late = h.vote(0x01, 3, VoteAnswer::Yes, 3);
        assert_eq!(
            late,
            Err(GovernanceError::ProposalFinalized(tx_hash(0x01).to_hex()))
        );
    }

    #[test]
    fn test_early_rejection_refunds_transfer() {
        let mut h = Harness::new();
        let tx = GovTx::TransferFund {
            from: validator_address(1),
            to: Address([7; 20]),
            amount: BigInt::from(500),
            reason: String::new(),
            expiry: Expiry::default(),
        };
        h.deliver(&tx, 1, 1, 0x01).unwrap();
        h.vote(0x01, 2, VoteAnswer::No, 2).unwrap();
        h.ledger.settle();

        assert_eq!(h.result(0x01), Some(ProposalResult::Rejected));
        assert_eq!(h.ledger.balance_of(&validator_address(1)), BigInt::from(990));
        assert_eq!(h.ledger.balance_of(&GOV_HOLD_ACCOUNT), BigInt::from(0));
        assert_eq!(h.ledger.balance_of(&Address([7; 20])), BigInt::from(0));
    }

    #[test]
    fn test_approved_transfer_pays_recipient() {
        let mut h = Harness::new();
        let tx = GovTx::TransferFund {
            from: validator_address(1),
            to: Address([7; 20]),
            amount: BigInt::from(500),
            reason: String::new(),
            expiry: Expiry::default(),
        };
        h.deliver(&tx, 1, 1, 0x01).unwrap();
        h.vote(0x01, 1, VoteAnswer::Yes, 2).unwrap();
        h.vote(0x01, 2, VoteAnswer::Yes, 2).unwrap();
        h.ledger.settle();
        assert_eq!(h.ledger.balance_of(&Address([7; 20])), BigInt::from(500));
        assert_eq!(h.ledger.balance_of(&GOV_HOLD_ACCOUNT), BigInt::from(0));
    }

    #[test]
    fn test_unvoted_proposal_expires_once() {
        let mut h = Harness::new();
        h.deliver(&change_gas_price(Some(5)), 1, 1, 0x01).unwrap();
        h.vote(0x01, 3, VoteAnswer::Yes, 2).unwrap();

        assert!(h.end_block(4).is_empty());
        assert_eq!(h.end_block(5), vec![tx_hash(0x01).to_hex()]);
        assert_eq!(h.result(0x01), Some(ProposalResult::Expired));
        assert!(h.end_block(6).is_empty());
        assert_eq!(h.registry.params().gas_price, 1);
    }

    #[test]
    fn test_lib_deploys_at_its_height() {
        let mut h = Harness::new();
        h.deliver(&lib_tx("propose/deployLibEni", 20), 1, 1, 0x01).unwrap();
        h.vote(0x01, 1, VoteAnswer::Yes, 2).unwrap();
        h.vote(0x01, 2, VoteAnswer::Yes, 2).unwrap();

        h.end_block(19);
        assert!(h.program.events.is_empty());
        h.end_block(20);
        assert_eq!(
            h.program.events,
            vec![ProgramEvent::Deployed {
                name: "reverse".into(),
                version: "v1.0.0".into(),
                height: 20
            }]
        );
        let p = h.svc.store().proposal(&tx_hash(0x01).to_hex()).unwrap();
        assert!(matches!(
            p.detail,
            ProposalDetail::DeployLibEni {
                status: LibStatus::Deployed,
                ..
            }
        ));
    }

    #[test]
    fn test_retire_and_upgrade_notify_program() {
        let mut h = Harness::new();
        let retire = GovTx::RetireProgram {
            preserved_validators: "val1, val2".into(),
            reason: String::new(),
            retired_block_height: Some(30),
        };
        h.deliver(&retire, 1, 1, 0x01).unwrap();
        h.vote(0x01, 1, VoteAnswer::Yes, 2).unwrap();
        h.vote(0x01, 2, VoteAnswer::Yes, 2).unwrap();

        assert_eq!(h.program.events, vec![ProgramEvent::Retire { height: 30 }]);
        assert_eq!(
            h.svc.retiring_validators(30),
            Some(vec![PubKey::from("val1"), PubKey::from("val2")])
        );
        assert_eq!(h.svc.retiring_validators(29), None);

        let upgrade = lib_tx("propose/upgradeProgram", 50);
        let err = h.deliver(&upgrade, 1, 3, 0x02);
        assert_eq!(err, Err(GovernanceError::OngoingRetiringFound));
    }

    proptest! {
        #[test]
        fn prop_tally_never_both_approved_and_rejected(
            total in 1i64..1_000_000,
            yes_share in 0u32..=100,
            no_share in 0u32..=100,
        ) {
            let yes = total * i64::from(yes_share) / 100;
            let no = (total - yes) * i64::from(no_share) / 100;
            let t = Tally { yes, no, total };
            prop_assert!(!(t.approved() && t.rejected()));
            if t.approved() {
                prop_assert!(t.quorum());
            }
        }
    }
}
