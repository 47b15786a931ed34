//! Block driver shared by the end-to-end tests.

use num_bigint::{BigInt, BigUint};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::RsaPrivateKey;
use serde_json::Value;
use shared_types::{ratio_from_ints, sha256, Address, Amount, PubKey};
use tv_01_params::{CubePubKey, Genesis, GenesisAccount, GenesisValidator, Params};
use tv_02_evm_bridge::{
    address_of, EthTransaction, InMemoryWorldState, SecretKey, TransferExecutor,
    UnsignedTransaction, U256,
};
use tv_03_native_store::InMemoryKVStore;
use tv_04_staking::domain::cube_message;
use tv_04_staking::{Candidate, Delegation, ValidatorUpdate};
use tv_06_app::abci::{
    Header, RequestBeginBlock, RequestEndBlock, RequestInitChain, ResponseDeliverTx, VoteInfo,
};
use tv_06_app::{AppConfig, Application, Envelope, TravisApp};

pub const CHAIN_ID: u64 = 18;
pub const GENESIS_TIME: i64 = 1_600_000_000;
pub const BLOCK_SECONDS: i64 = 10;

pub type App = TravisApp<InMemoryWorldState, TransferExecutor, InMemoryKVStore>;

// =============================================================================
// ACCOUNTS AND AMOUNTS
// =============================================================================

pub fn key(seed: u8) -> SecretKey {
    SecretKey::from_slice(&[seed; 32]).unwrap()
}

pub fn addr(seed: u8) -> Address {
    address_of(&key(seed))
}

/// `10^exp` wei.
pub fn pow10(exp: u32) -> Amount {
    BigInt::from(10u8).pow(exp)
}

// =============================================================================
// CUBE
// =============================================================================

/// An RSA cube key pair able to pre-authorize delegations.
pub struct TestCube {
    private: RsaPrivateKey,
    pub key: CubePubKey,
}

impl TestCube {
    pub fn new(batch: &str) -> Self {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        Self {
            private,
            key: CubePubKey {
                cube_batch: batch.to_string(),
                pub_key: pem,
            },
        }
    }

    /// Textbook RSA over the digest of the cube message, hex encoded.
    pub fn sign(&self, address: &Address, nonce: u64) -> String {
        let n = BigUint::from_bytes_be(&self.private.n().to_bytes_be());
        let d = BigUint::from_bytes_be(&self.private.d().to_bytes_be());
        let m = BigUint::from_bytes_be(&sha256(cube_message(address, nonce).as_bytes()));
        hex::encode(m.modpow(&d, &n).to_bytes_be())
    }
}

// =============================================================================
// GENESIS
// =============================================================================

/// Flat fees of 10 wei, no inflation and a single reward epoch at height 1,
/// so balances stay exact.
pub fn params() -> Params {
    Params {
        gas_price: 1,
        inflation_rate: 0,
        declare_candidacy_gas: 10,
        update_candidacy_gas: 10,
        set_comp_rate_gas: 10,
        change_param_proposal_gas: 10,
        transfer_fund_proposal_gas: 10,
        self_staking_ratio: ratio_from_ints(1, 10),
        max_slash_blocks: 3,
        slash_ratio: ratio_from_ints(1, 10),
        unstake_waiting_period: 4,
        min_staking_amount: 0,
        cal_vp_interval: 1_000,
        ..Params::default()
    }
}

pub fn validator(seed: u8, pub_key: &str, shares: Amount) -> GenesisValidator {
    GenesisValidator {
        pub_key: PubKey::new(pub_key),
        address: addr(seed),
        max_amount: &shares * BigInt::from(10),
        shares,
        comp_rate: ratio_from_ints(1, 5),
        name: pub_key.to_string(),
    }
}

pub fn account(seed: u8, balance: Amount) -> GenesisAccount {
    GenesisAccount {
        address: addr(seed),
        balance,
    }
}

/// Validator `val1` owned by key 1 with 100 tokens staked.
pub fn genesis() -> Genesis {
    Genesis {
        params: params(),
        validators: vec![validator(1, "val1", pow10(20))],
        accounts: vec![account(1, pow10(21))],
    }
}

// =============================================================================
// CHAIN
// =============================================================================

/// A running app plus the consensus-side facts needed to build blocks.
pub struct Chain {
    pub app: App,
    validators: Vec<PubKey>,
}

impl Chain {
    pub fn new(genesis: &Genesis) -> Self {
        let mut config = AppConfig::default();
        config.bridge.chain_id = CHAIN_ID;
        let mut app = TravisApp::open(
            config,
            InMemoryWorldState::new(),
            TransferExecutor,
            InMemoryKVStore::new(),
        )
        .unwrap();
        app.init_chain(RequestInitChain {
            chain_id: "travis-e2e".into(),
            time: GENESIS_TIME,
            validators: Vec::new(),
            app_state_bytes: genesis.to_json().unwrap(),
        });
        let validators = genesis.validators.iter().map(|v| v.pub_key.clone()).collect();
        Self { app, validators }
    }

    /// Height of the block being built (or about to be).
    pub fn height(&self) -> i64 {
        self.app.working_height()
    }

    pub fn begin(&mut self) {
        self.begin_with(&[], &[]);
    }

    /// Opens a block in which `absent` did not sign the previous block and
    /// `byzantine` are reported for equivocation.
    pub fn begin_with(&mut self, absent: &[&str], byzantine: &[&str]) {
        let height = self.height();
        let votes = self
            .validators
            .iter()
            .map(|pk| VoteInfo {
                pub_key: pk.clone(),
                signed_last_block: !absent.contains(&pk.as_str()),
            })
            .collect();
        self.app.begin_block(RequestBeginBlock {
            header: Header {
                chain_id: "travis-e2e".into(),
                height,
                time: GENESIS_TIME + height * BLOCK_SECONDS,
                proposer: self.validators[0].clone(),
                coinbase: addr(1),
            },
            last_commit_votes: votes,
            byzantine_validators: byzantine.iter().map(|pk| PubKey::new(*pk)).collect(),
        });
    }

    /// Delivers `tx` and asserts it was accepted.
    pub fn deliver(&mut self, tx: &[u8]) -> ResponseDeliverTx {
        let resp = self.app.deliver_tx(tx);
        assert!(resp.is_ok(), "deliver failed: {} ({})", resp.log, resp.code);
        resp
    }

    /// Ends and commits the open block.
    pub fn finish(&mut self) -> (Vec<ValidatorUpdate>, Vec<u8>) {
        let height = self.height();
        let updates = self.app.end_block(RequestEndBlock { height }).validator_updates;
        let root = self.app.commit().data;
        (updates, root)
    }

    /// A whole block carrying `txs`; returns the app root.
    pub fn block(&mut self, txs: &[Vec<u8>]) -> Vec<u8> {
        self.begin();
        for tx in txs {
            self.deliver(tx);
        }
        self.finish().1
    }

    /// Signs a native transaction at the sender's current nonce.
    pub fn native(&self, seed: u8, kind: &str, data: Value) -> Vec<u8> {
        let nonce = self.app.bridge().nonce(&addr(seed));
        let payload = Envelope::new(kind, data).to_bytes().unwrap();
        UnsignedTransaction::native(nonce, payload).sign(&key(seed), CHAIN_ID)
    }

    pub fn transfer(&self, seed: u8, to: Address, value: u64) -> Vec<u8> {
        let nonce = self.app.bridge().nonce(&addr(seed));
        UnsignedTransaction::transfer(
            nonce,
            to,
            U256::from(value),
            U256::from(1_000_000_000u64),
            21_000,
        )
        .sign(&key(seed), CHAIN_ID)
    }

    // === Committed views ===

    pub fn balance(&self, seed: u8) -> Amount {
        self.app.balance(&addr(seed))
    }

    pub fn candidate(&self, owner_seed: u8) -> Candidate {
        self.app
            .staking()
            .store()
            .candidate_by_address(&addr(owner_seed))
            .cloned()
            .unwrap_or_else(|| panic!("no candidate owned by key {owner_seed}"))
    }

    pub fn delegation(&self, delegator_seed: u8, owner_seed: u8) -> Option<Delegation> {
        let candidate = self.candidate(owner_seed);
        self.app
            .staking()
            .store()
            .delegation(&addr(delegator_seed), candidate.id)
            .cloned()
    }
}

/// Proposal id of a governance transaction: its hash in hex.
pub fn tx_id(raw: &[u8]) -> String {
    EthTransaction::decode(raw).unwrap().hash.to_hex()
}
