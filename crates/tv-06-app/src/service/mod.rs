//! # Travis Application
//!
//! Owns every substrate of the chain state and drives them through the
//! consensus callbacks.
//!
//! ## State ownership
//!
//! | Field | Substrate | Root |
//! |-------|-----------|------|
//! | `bridge` | EVM world state, deferred transfers, block fees | `eth_root` |
//! | `native` | params blob, absent validators, award accumulator | `native_root` |
//! | `staking`, `governance`, `scheduled` | journaled tables | `aux_db_root` |
//!
//! The journaled tables and the native overlay form the block transaction:
//! BeginBlock opens it implicitly, a failed DeliverTx rolls back to its
//! savepoint, Commit persists everything in one batch.

mod lifecycle;
mod query;
mod router;

use num_traits::Zero;
use shared_types::{Address, Amount, BlockHeight, PubKey};
use tracing::{debug, info};
use tv_01_params::{ParamRegistry, Params, PARAMS_KEY};
use tv_02_evm_bridge::{EthTransaction, EvmBridge, Executor, WorldState};
use tv_03_native_store::{KeyValueStore, VersionedStore};
use tv_04_staking::{AbsentValidators, StakingService, TxContext, ABSENT_VALIDATORS_KEY, AWARD_ACCUMULATOR_KEY};
use tv_05_governance::{GovernanceService, ProgramControl, RecordingProgramControl};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::store::ScheduledStore;

/// Metadata entry holding the last committed app hash.
pub const APP_HASH_META: &str = "app_hash";

/// Header data of the block under construction.
#[derive(Debug, Clone, Default)]
struct BlockState {
    height: BlockHeight,
    time: i64,
    proposer: PubKey,
    byzantine: Vec<PubKey>,
}

pub struct TravisApp<S: WorldState, E: Executor, KV: KeyValueStore> {
    config: AppConfig,
    bridge: EvmBridge<S, E>,
    native: VersionedStore<KV>,
    registry: ParamRegistry,
    staking: StakingService,
    governance: GovernanceService,
    scheduled: ScheduledStore,
    program: Box<dyn ProgramControl + Send>,
    block: BlockState,
    last_app_hash: Vec<u8>,
}

impl<S: WorldState, E: Executor> TravisApp<S, E, Box<dyn KeyValueStore>> {
    /// Opens the storage backend selected by `config.storage`.
    pub fn from_config(config: AppConfig, state: S, executor: E) -> AppResult<Self> {
        let kv = config.storage.open_backend()?;
        Self::open(config, state, executor, kv)
    }
}

impl<S: WorldState, E: Executor, KV: KeyValueStore> TravisApp<S, E, KV> {
    /// Restores the application from `kv` (empty for a new chain).
    pub fn open(config: AppConfig, state: S, executor: E, kv: KV) -> AppResult<Self> {
        let native = VersionedStore::open(kv)?;
        let registry = load_registry(&native)?;
        let mut staking = StakingService::load(native.kv())?;
        staking.set_absent_validators(load_absent(&native)?);
        let governance = GovernanceService::load(native.kv())?;
        let scheduled = ScheduledStore::load(native.kv())?;
        let last_app_hash = native.get_meta(APP_HASH_META)?.unwrap_or_default();
        let bridge = EvmBridge::new(config.bridge.clone(), state, executor);

        info!(
            height = native.version(),
            app_hash = %hex::encode(&last_app_hash),
            "Application opened"
        );
        Ok(Self {
            config,
            bridge,
            native,
            registry,
            staking,
            governance,
            scheduled,
            program: Box::new(RecordingProgramControl::new()),
            block: BlockState::default(),
            last_app_hash,
        })
    }

    /// Replaces the adapter receiving library deployments, retirements and
    /// upgrades.
    pub fn with_program_control(mut self, program: Box<dyn ProgramControl + Send>) -> Self {
        self.program = program;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bridge(&self) -> &EvmBridge<S, E> {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut EvmBridge<S, E> {
        &mut self.bridge
    }

    pub fn native(&self) -> &VersionedStore<KV> {
        &self.native
    }

    pub fn params(&self) -> &Params {
        self.registry.params()
    }

    pub fn registry(&self) -> &ParamRegistry {
        &self.registry
    }

    pub fn staking(&self) -> &StakingService {
        &self.staking
    }

    pub fn governance(&self) -> &GovernanceService {
        &self.governance
    }

    pub fn scheduled(&self) -> &ScheduledStore {
        &self.scheduled
    }

    pub fn last_block_height(&self) -> BlockHeight {
        self.native.version()
    }

    pub fn last_app_hash(&self) -> &[u8] {
        &self.last_app_hash
    }

    /// Committed EVM balance of `address`.
    pub fn balance(&self, address: &Address) -> Amount {
        self.bridge.committed_balance(address)
    }

    /// Height of the block being built (or next to be built).
    pub fn working_height(&self) -> BlockHeight {
        self.native.version() + 1
    }

    fn tx_context(&self, tx: &EthTransaction) -> TxContext {
        TxContext {
            sender: tx.sender,
            nonce: tx.nonce,
            height: self.working_height(),
            block_time: self.block.time,
        }
    }

    /// Reward value collected and not yet distributed.
    pub fn award_accumulator(&self) -> AppResult<Amount> {
        match self.native.get(AWARD_ACCUMULATOR_KEY)? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|e| AppError::corrupt(AWARD_ACCUMULATOR_KEY, e))?;
                text.parse::<Amount>()
                    .map_err(|e| AppError::corrupt(AWARD_ACCUMULATOR_KEY, e))
            }
            None => Ok(Amount::zero()),
        }
    }

    fn set_award_accumulator(&mut self, amount: &Amount) {
        self.native
            .set(AWARD_ACCUMULATOR_KEY, amount.to_string().into_bytes());
    }

    /// Drops every uncommitted change of the native substrates and reloads
    /// the values cached from them.
    fn rollback_native(&mut self) -> AppResult<()> {
        self.staking.rollback();
        self.governance.rollback();
        tv_03_native_store::Journaled::rollback(&mut self.scheduled);
        self.native.rollback();
        self.registry = load_registry(&self.native)?;
        self.staking.set_absent_validators(load_absent(&self.native)?);
        debug!(height = self.block.height, "Native block transaction rolled back");
        Ok(())
    }
}

fn load_registry<KV: KeyValueStore>(native: &VersionedStore<KV>) -> AppResult<ParamRegistry> {
    match native.get(PARAMS_KEY)? {
        Some(blob) => Ok(ParamRegistry::from_blob(&blob)?),
        None => Ok(ParamRegistry::new(Params::default())),
    }
}

fn load_absent<KV: KeyValueStore>(native: &VersionedStore<KV>) -> AppResult<AbsentValidators> {
    match native.get(ABSENT_VALIDATORS_KEY)? {
        Some(bytes) => AbsentValidators::from_json(&bytes)
            .map_err(|e| AppError::corrupt(ABSENT_VALIDATORS_KEY, e)),
        None => Ok(AbsentValidators::new()),
    }
}
