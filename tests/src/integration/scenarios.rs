//! # End-to-End Block Scenarios
//!
//! Each test runs real blocks through the app:
//!
//! 1. **Declare**: self-stake leaves the owner's balance at EndBlock
//! 2. **Delegate**: cube-authorized stake joins a candidate
//! 3. **Withdraw**: stake waits in an unstake request, then returns
//! 4. **Absence**: a silent validator is slashed three times, then dropped
//! 5. **Evidence**: a byzantine validator is slashed once
//! 6. **Governance**: an approved parameter change governs later withdrawals

use num_traits::Zero;
use serde_json::json;
use shared_types::{ErrorCode, PubKey, HOLD_ACCOUNT};
use tv_01_params::{ParamRegistry, PARAMS_KEY};
use tv_04_staking::domain::RequestState;
use tv_04_staking::{CandidateState, BYZANTINE_REASON};
use tv_05_governance::ProposalResult;
use tv_06_app::abci::RequestQuery;
use tv_06_app::Application;

use super::harness::*;

const OWNER: u8 = 10;
const DELEGATOR: u8 = 11;

// =============================================================================
// FIXTURES
// =============================================================================

/// Owner with `10^22` wei and a delegator with `10^21` wei, next to `val1`.
fn staking_genesis(cube: Option<&TestCube>) -> tv_01_params::Genesis {
    let mut genesis = genesis();
    genesis.accounts.push(account(OWNER, pow10(22)));
    genesis.accounts.push(account(DELEGATOR, pow10(21)));
    if let Some(cube) = cube {
        genesis.params.cube_pub_keys = serde_json::to_string(&[cube.key.clone()]).unwrap();
    }
    genesis
}

fn declare_tx(chain: &Chain) -> Vec<u8> {
    chain.native(
        OWNER,
        "stake/declareCandidacy",
        json!({
            "pub_key": "valA",
            "max_amount": pow10(21).to_string(),
            "comp_rate": "1/5",
            "description": {"name": "alpha", "website": "https://alpha.example"}
        }),
    )
}

fn delegate_tx(chain: &Chain, cube: &TestCube, amount: &shared_types::Amount) -> Vec<u8> {
    let nonce = chain.app.bridge().nonce(&addr(DELEGATOR));
    chain.native(
        DELEGATOR,
        "stake/delegate",
        json!({
            "validator_address": addr(OWNER).to_string(),
            "amount": amount.to_string(),
            "cube_batch": "01",
            "sig": cube.sign(&addr(DELEGATOR), nonce)
        }),
    )
}

fn withdraw_tx(chain: &Chain, seed: u8, owner: u8, amount: &shared_types::Amount) -> Vec<u8> {
    chain.native(
        seed,
        "stake/withdraw",
        json!({
            "validator_address": addr(owner).to_string(),
            "amount": amount.to_string()
        }),
    )
}

/// Genesis block, then the owner's declaration; returns the chain at height 2.
fn declared(cube: Option<&TestCube>) -> Chain {
    let mut chain = Chain::new(&staking_genesis(cube));
    // Height 1 is a reward epoch; keep the declaration out of it.
    chain.block(&[]);
    let tx = declare_tx(&chain);
    chain.block(&[tx]);
    chain
}

/// Declaration plus a `5·10^20` cube-signed delegation.
fn delegated(cube: &TestCube) -> Chain {
    let mut chain = declared(Some(cube));
    let tx = delegate_tx(&chain, cube, &(pow10(20) * 5));
    chain.block(&[tx]);
    chain
}

// =============================================================================
// SCENARIO 1: DECLARE + SELF-STAKE
// =============================================================================

#[test]
fn test_declare_candidacy_stakes_the_self_amount() {
    let chain = declared(None);

    assert_eq!(chain.balance(OWNER), pow10(22) - pow10(20) - 10);

    let c = chain.candidate(OWNER);
    assert_eq!(c.pub_key, PubKey::new("valA"));
    assert_eq!(c.shares, pow10(20));
    assert_eq!(c.max_shares, pow10(21));
    assert_eq!(c.owner_address, addr(OWNER));
    assert!(!c.verified);
    assert!(c.active);
    assert_eq!(c.state, CandidateState::Candidate);
    assert_eq!(c.num_of_delegators, 1);

    let d = chain.delegation(OWNER, OWNER).unwrap();
    assert_eq!(d.delegate_amount, pow10(20));
    assert!(d.award_amount.is_zero());
    assert!(d.withdraw_amount.is_zero());
    assert!(d.pending_withdraw_amount.is_zero());
    assert!(d.slash_amount.is_zero());
}

#[test]
fn test_declare_with_taken_pub_key_is_rejected() {
    let mut chain = declared(None);
    chain.begin();
    let tx = chain.native(
        DELEGATOR,
        "stake/declareCandidacy",
        json!({
            "pub_key": "valA",
            "max_amount": pow10(20).to_string(),
            "comp_rate": "1/5",
            "description": {"name": "copy"}
        }),
    );
    let resp = chain.app.deliver_tx(&tx);
    assert!(!resp.is_ok());
    assert_eq!(resp.code, ErrorCode::CandidateExists.as_u32());
    chain.finish();
    assert_eq!(chain.balance(DELEGATOR), pow10(21));
}

// =============================================================================
// SCENARIO 2: DELEGATE
// =============================================================================

#[test]
fn test_cube_signed_delegation() {
    let cube = TestCube::new("01");
    let chain = delegated(&cube);

    assert_eq!(chain.balance(DELEGATOR), pow10(20) * 5);
    let c = chain.candidate(OWNER);
    assert_eq!(c.shares, pow10(20) * 6);
    assert_eq!(c.num_of_delegators, 2);

    let d = chain.delegation(DELEGATOR, OWNER).unwrap();
    assert_eq!(d.delegate_amount, pow10(20) * 5);
    assert_eq!(d.shares(), pow10(20) * 5);
}

#[test]
fn test_delegation_with_stale_cube_signature_fails() {
    let cube = TestCube::new("01");
    let mut chain = declared(Some(&cube));
    chain.begin();
    let tx = chain.native(
        DELEGATOR,
        "stake/delegate",
        json!({
            "validator_address": addr(OWNER).to_string(),
            "amount": pow10(20).to_string(),
            "cube_batch": "01",
            // Signed for a nonce the delegator is not at.
            "sig": cube.sign(&addr(DELEGATOR), 7)
        }),
    );
    let resp = chain.app.deliver_tx(&tx);
    assert!(!resp.is_ok());
    chain.finish();

    assert_eq!(chain.balance(DELEGATOR), pow10(21));
    assert!(chain.delegation(DELEGATOR, OWNER).is_none());
    assert_eq!(chain.candidate(OWNER).shares, pow10(20));
}

// =============================================================================
// SCENARIO 3: WITHDRAW WITH WAITING PERIOD
// =============================================================================

#[test]
fn test_withdraw_waits_for_the_unstake_period() {
    let cube = TestCube::new("01");
    let mut chain = delegated(&cube);
    let amount = pow10(20) * 2;

    let h = chain.height();
    let tx = withdraw_tx(&chain, DELEGATOR, OWNER, &amount);
    chain.block(&[tx]);

    let d = chain.delegation(DELEGATOR, OWNER).unwrap();
    assert_eq!(d.pending_withdraw_amount, amount);
    assert_eq!(d.shares(), pow10(20) * 3);
    assert_eq!(chain.candidate(OWNER).shares, pow10(20) * 6);
    assert_eq!(chain.balance(DELEGATOR), pow10(20) * 5);

    let requests = chain
        .app
        .staking()
        .store()
        .pending_unstakes_of(&addr(DELEGATOR), None)
        .into_iter()
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(requests.len(), 1);
    let request_id = requests[0].id;
    assert_eq!(requests[0].initiated_block_height, h);
    assert_eq!(requests[0].performed_block_height, h + 4);

    for _ in 0..3 {
        chain.block(&[]);
    }
    assert_eq!(chain.balance(DELEGATOR), pow10(20) * 5);

    chain.block(&[]);
    assert_eq!(chain.app.last_block_height(), h + 4);
    let request = chain
        .app
        .staking()
        .store()
        .unstake_request(request_id)
        .unwrap()
        .clone();
    assert_eq!(request.state, RequestState::Completed);

    let d = chain.delegation(DELEGATOR, OWNER).unwrap();
    assert_eq!(d.withdraw_amount, amount);
    assert!(d.pending_withdraw_amount.is_zero());
    assert_eq!(chain.balance(DELEGATOR), pow10(20) * 7);
    assert_eq!(chain.candidate(OWNER).shares, pow10(20) * 4);
}

#[test]
fn test_owner_cannot_drop_below_self_stake() {
    let mut chain = declared(None);
    chain.begin();
    let tx = withdraw_tx(&chain, OWNER, OWNER, &pow10(18));
    let resp = chain.app.deliver_tx(&tx);
    assert_eq!(resp.code, ErrorCode::CandidateWithdrawalDisallowed.as_u32());
    chain.finish();
}

// =============================================================================
// SCENARIO 4: ABSENT VALIDATOR REMOVAL
// =============================================================================

#[test]
fn test_absent_validator_is_slashed_each_block_then_removed() {
    let mut genesis = genesis();
    genesis.params.cal_vp_interval = 4;
    genesis.validators.push(validator(2, "val2", pow10(20)));
    let mut chain = Chain::new(&genesis);
    let val2 = PubKey::new("val2");

    let mut expected = pow10(20);
    for count in 1..=3i16 {
        chain.begin_with(&["val2"], &[]);
        chain.finish();
        expected = &expected * 9 / 10;

        let absence = *chain.app.staking().absent_validators().get(&val2).unwrap();
        assert_eq!(absence.count, count);
        assert_eq!(chain.candidate(2).shares, expected);
    }

    let c = chain.candidate(2);
    assert!(!c.active);
    assert_eq!(c.voting_power, 0);
    assert_eq!(chain.candidate(1).shares, pow10(20));

    // Height 4 is the next epoch.
    chain.begin();
    let (updates, _) = chain.finish();
    let removal = updates.iter().find(|u| u.pub_key == val2).unwrap();
    assert_eq!(removal.power, 0);
    assert!(updates.iter().all(|u| u.pub_key == val2 || u.power > 0));
    assert_ne!(chain.candidate(2).state, CandidateState::Validator);
}

#[test]
fn test_absence_streak_restarts_after_a_signed_block() {
    let mut genesis = genesis();
    genesis.validators.push(validator(2, "val2", pow10(20)));
    let mut chain = Chain::new(&genesis);

    chain.begin_with(&["val2"], &[]);
    chain.finish();
    chain.begin();
    chain.finish();
    assert!(chain
        .app
        .staking()
        .absent_validators()
        .get(&PubKey::new("val2"))
        .is_none());

    chain.begin_with(&["val2"], &[]);
    chain.finish();
    let absence = *chain
        .app
        .staking()
        .absent_validators()
        .get(&PubKey::new("val2"))
        .unwrap();
    assert_eq!(absence.count, 1);
    assert!(chain.candidate(2).active);
}

// =============================================================================
// SCENARIO 5: BYZANTINE EVIDENCE
// =============================================================================

#[test]
fn test_byzantine_validator_is_slashed_once() {
    let mut genesis = genesis();
    genesis.validators.push(validator(2, "val2", pow10(20)));
    let mut chain = Chain::new(&genesis);
    chain.block(&[]);
    let hold = chain.app.balance(&HOLD_ACCOUNT);

    let h = chain.height();
    chain.begin_with(&[], &["val2"]);
    chain.finish();

    let w = chain.candidate(2);
    assert_eq!(w.shares, pow10(19) * 9);
    let store = chain.app.staking().store();
    let slashes = store.slashes_of(w.id);
    assert_eq!(slashes.len(), 1);
    assert_eq!(slashes[0].reason, BYZANTINE_REASON);
    assert_eq!(slashes[0].block_height, h);
    assert_eq!(slashes[0].slash_amount, pow10(19));

    let v = chain.candidate(1);
    assert_eq!(v.shares, pow10(20));
    assert!(store.slashes_of(v.id).is_empty());
    assert_eq!(chain.app.balance(&HOLD_ACCOUNT), hold - pow10(19));
}

// =============================================================================
// SCENARIO 6: GOVERNANCE CHANGE PARAM
// =============================================================================

#[test]
fn test_approved_param_change_governs_later_withdrawals() {
    let mut genesis = genesis();
    genesis.accounts.push(account(DELEGATOR, pow10(21)));
    let mut chain = Chain::new(&genesis);
    chain.block(&[]);

    // A delegation to val1 that can be withdrawn later.
    let tx = chain.native(
        DELEGATOR,
        "stake/delegate",
        json!({"validator_address": addr(1).to_string(), "amount": pow10(20).to_string()}),
    );
    chain.block(&[tx]);

    let h = chain.height();
    let propose = chain.native(
        1,
        "governance/propose/changeParam",
        json!({
            "name": "unstake_waiting_period",
            "value": "100",
            "reason": "longer cool-down"
        }),
    );
    let proposal_id = tx_id(&propose);
    chain.block(&[propose]);
    chain.block(&[]);
    assert_eq!(chain.app.params().unstake_waiting_period, 4);

    let vote = chain.native(
        1,
        "governance/vote",
        json!({"proposal_id": proposal_id, "answer": "Y"}),
    );
    chain.block(&[vote]);
    assert_eq!(chain.app.last_block_height(), h + 2);

    let proposal = chain
        .app
        .governance()
        .store()
        .proposal(&proposal_id)
        .unwrap()
        .clone();
    assert_eq!(proposal.result, Some(ProposalResult::Approved));
    assert_eq!(chain.app.params().unstake_waiting_period, 100);

    let blob = chain.app.query(RequestQuery::new("/key", PARAMS_KEY.to_vec()));
    assert!(blob.is_ok());
    let stored = ParamRegistry::from_blob(&blob.value).unwrap();
    assert_eq!(stored.params().unstake_waiting_period, 100);

    let tx = withdraw_tx(&chain, DELEGATOR, 1, &pow10(19));
    chain.block(&[tx]);
    let request = chain.app.staking().store().pending_unstakes_of(&addr(DELEGATOR), None)[0].clone();
    assert_eq!(request.initiated_block_height, h + 3);
    assert_eq!(request.performed_block_height, h + 3 + 100);
}

#[test]
fn test_rejected_param_change_leaves_params_alone() {
    let mut chain = Chain::new(&genesis());
    chain.block(&[]);

    let propose = chain.native(
        1,
        "governance/propose/changeParam",
        json!({"name": "gas_price", "value": "7", "expire_block_height": 10}),
    );
    let proposal_id = tx_id(&propose);
    chain.block(&[propose]);
    let vote = chain.native(
        1,
        "governance/vote",
        json!({"proposal_id": proposal_id, "answer": "N"}),
    );
    chain.block(&[vote]);

    let proposal = chain.app.governance().store().proposal(&proposal_id).unwrap();
    assert_eq!(proposal.result, Some(ProposalResult::Rejected));
    assert_eq!(chain.app.params().gas_price, 1);
}
