//! Replaying the same blocks on a fresh node yields the same app roots.

use serde_json::json;

use super::harness::*;

/// Transactions of one block plus the consensus-side reports.
struct BlockPlan {
    txs: Vec<Vec<u8>>,
    absent: &'static [&'static str],
    byzantine: &'static [&'static str],
}

fn genesis_for_replay() -> tv_01_params::Genesis {
    let mut genesis = genesis();
    genesis.params.cal_vp_interval = 3;
    genesis.params.inflation_rate = 8;
    genesis.validators.push(validator(2, "val2", pow10(20)));
    genesis.accounts.push(account(3, pow10(22)));
    genesis.accounts.push(account(4, pow10(21)));
    genesis
}

/// Runs `heights` blocks on `chain`, building each block's transactions from
/// the chain's own nonces, and returns the plans and roots.
fn drive(chain: &mut Chain, heights: i64) -> (Vec<BlockPlan>, Vec<Vec<u8>>) {
    let mut plans = Vec::new();
    let mut roots = Vec::new();
    for _ in 0..heights {
        let h = chain.height();
        let mut plan = BlockPlan {
            txs: Vec::new(),
            absent: &[],
            byzantine: &[],
        };
        match h {
            2 => plan.txs.push(chain.native(
                3,
                "stake/declareCandidacy",
                json!({
                    "pub_key": "val3",
                    "max_amount": pow10(21).to_string(),
                    "comp_rate": "1/4",
                    "description": {"name": "three"}
                }),
            )),
            3 => {
                plan.txs.push(chain.native(
                    4,
                    "stake/delegate",
                    json!({"validator_address": addr(3).to_string(), "amount": pow10(20).to_string()}),
                ));
                plan.txs.push(chain.transfer(1, addr(4), 12_345));
                plan.absent = &["val2"];
            }
            4 => plan.byzantine = &["val2"],
            5 => plan.txs.push(chain.native(
                4,
                "stake/withdraw",
                json!({"validator_address": addr(3).to_string(), "amount": pow10(19).to_string()}),
            )),
            _ => {}
        }

        chain.begin_with(plan.absent, plan.byzantine);
        for tx in &plan.txs {
            chain.deliver(tx);
        }
        roots.push(chain.finish().1);
        plans.push(plan);
    }
    (plans, roots)
}

#[test]
fn test_replay_reproduces_every_root() {
    let genesis = genesis_for_replay();
    let mut original = Chain::new(&genesis);
    let (plans, roots) = drive(&mut original, 10);

    let mut replica = Chain::new(&genesis);
    for (plan, expected) in plans.iter().zip(&roots) {
        replica.begin_with(plan.absent, plan.byzantine);
        for tx in &plan.txs {
            replica.deliver(tx);
        }
        let (_, root) = replica.finish();
        assert_eq!(&root, expected, "root diverged at height {}", replica.app.last_block_height());
    }

    assert_eq!(replica.app.last_app_hash(), original.app.last_app_hash());
    assert_eq!(replica.app.staking().digest(), original.app.staking().digest());
    assert_eq!(replica.balance(4), original.balance(4));
}

#[test]
fn test_roots_are_twenty_bytes_and_chain_forward() {
    let mut chain = Chain::new(&genesis_for_replay());
    let (_, roots) = drive(&mut chain, 4);
    assert!(roots.iter().all(|r| r.len() == 20));
    for pair in roots.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
}

#[test]
fn test_diverging_history_changes_the_root() {
    let genesis = genesis_for_replay();
    let mut a = Chain::new(&genesis);
    let mut b = Chain::new(&genesis);
    a.block(&[]);
    b.block(&[]);

    let tx = a.transfer(1, addr(4), 1);
    let root_a = a.block(&[tx]);
    let tx = b.transfer(1, addr(4), 2);
    let root_b = b.block(&[tx]);
    assert_ne!(root_a, root_b);
}
