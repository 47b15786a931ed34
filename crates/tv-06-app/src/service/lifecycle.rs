//! Block lifecycle: InitChain, BeginBlock, EndBlock, Commit.

use num_traits::Zero;
use shared_types::{Amount, PubKey, HOLD_ACCOUNT};
use tracing::{debug, error, info, warn};
use tv_01_params::{Genesis, PARAMS_KEY};
use tv_02_evm_bridge::{BlockContext, Executor, WorldState};
use tv_03_native_store::{meta_op, Journaled, KeyValueStore};
use tv_04_staking::domain::block_subsidy;
use tv_04_staking::{ValidatorUpdate, ABSENT_VALIDATORS_KEY, AWARD_INFO_KEY};
use tv_05_governance::Effects;

use super::{BlockState, TravisApp, APP_HASH_META};
use crate::abci::{
    RequestBeginBlock, RequestEndBlock, RequestInitChain, RequestQuery, ResponseCheckTx,
    ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInfo, ResponseInitChain,
    ResponseQuery,
};
use crate::domain::{app_root, aux_db_root, ScheduleStatus, ScheduledTx};
use crate::errors::{AppError, AppResult};
use crate::ports::Application;

/// Metadata entry written once the genesis state is persisted.
const GENESIS_META: &str = "genesis_chain_id";

impl<S: WorldState, E: Executor, KV: KeyValueStore> TravisApp<S, E, KV> {
    pub fn info_response(&self) -> ResponseInfo {
        ResponseInfo {
            version: self.config.version.clone(),
            last_block_height: self.last_block_height(),
            last_block_app_hash: self.last_app_hash.clone(),
        }
    }

    // =========================================================================
    // INIT CHAIN
    // =========================================================================

    /// Loads the genesis document, funds the accounts, seats the initial
    /// validators and persists the result as version 0.
    pub fn init_chain_state(&mut self, req: RequestInitChain) -> AppResult<ResponseInitChain> {
        if self.last_block_height() > 0 || self.native.get_meta(GENESIS_META)?.is_some() {
            return Err(AppError::AlreadyInitialized(self.last_block_height()));
        }
        let genesis = Genesis::from_json(&req.app_state_bytes)?;
        self.registry.replace(genesis.params.clone());

        for account in &genesis.accounts {
            self.bridge
                .fund_genesis_account(&account.address, &account.balance);
        }
        let (validators, total) = self
            .staking
            .init_genesis(&genesis.validators, 0, req.time)?;
        if total > Amount::zero() {
            self.bridge.fund_genesis_account(&HOLD_ACCOUNT, &total);
        }
        self.bridge.commit()?;

        self.registry.take_dirty();
        self.native.set(PARAMS_KEY, self.registry.to_blob()?);
        let mut ops = self.staking.commit_ops()?;
        ops.extend(self.governance.commit_ops()?);
        ops.extend(self.scheduled.commit_ops()?);
        ops.push(meta_op(GENESIS_META, req.chain_id.clone()));
        self.native.commit(0, ops)?;

        info!(
            chain_id = %req.chain_id,
            validators = validators.len(),
            accounts = genesis.accounts.len(),
            staked = %total,
            "Chain initialized"
        );
        Ok(ResponseInitChain { validators })
    }

    // =========================================================================
    // BEGIN BLOCK
    // =========================================================================

    /// Opens the block: header context, absence bookkeeping, due scheduled
    /// calls.
    pub fn begin_block_state(&mut self, req: RequestBeginBlock) -> AppResult<()> {
        let header = req.header;
        if header.height != self.working_height() {
            warn!(
                header = header.height,
                expected = self.working_height(),
                "Header height differs from the next store version"
            );
        }
        self.block = BlockState {
            height: self.working_height(),
            time: header.time,
            proposer: header.proposer,
            byzantine: req.byzantine_validators,
        };
        self.bridge.begin_block(BlockContext {
            height: self.block.height,
            time: header.time,
            coinbase: header.coinbase,
            gas_limit: self.config.bridge.block_gas_limit,
        });
        self.staking.begin_block(header.time);

        let absent: Vec<PubKey> = req
            .last_commit_votes
            .into_iter()
            .filter(|v| !v.signed_last_block)
            .map(|v| v.pub_key)
            .collect();
        self.staking.record_absences(self.block.height, &absent);

        self.run_scheduled()?;
        debug!(
            height = self.block.height,
            time = self.block.time,
            absent = absent.len(),
            "Block begun"
        );
        Ok(())
    }

    /// Replays every pending scheduled call due at the block time.
    fn run_scheduled(&mut self) -> AppResult<()> {
        let height = self.block.height;
        for tx in self.scheduled.due(self.block.time) {
            let status = match self.bridge.execute_scheduled(&tx.call(), tx.parent_tx_hash) {
                Ok(receipt) if receipt.success => {
                    for call in &receipt.scheduled {
                        self.scheduled
                            .schedule(ScheduledTx::new(tx.parent_tx_hash, call, height))?;
                    }
                    ScheduleStatus::Done
                }
                Ok(_) => ScheduleStatus::Failed,
                Err(e) => {
                    let e = AppError::from(e);
                    if e.is_fatal() {
                        return Err(e);
                    }
                    debug!(hash = %tx.hash, error = %e, "Scheduled call failed");
                    ScheduleStatus::Failed
                }
            };
            info!(hash = %tx.hash, status = status.as_str(), "Scheduled call executed");
            self.scheduled.finish(tx, status, height)?;
        }
        Ok(())
    }

    // =========================================================================
    // END BLOCK
    // =========================================================================

    /// Settles the block: slashing, rewards, validator set, unstake requests
    /// and proposal expiry.
    pub fn end_block_state(&mut self, _req: RequestEndBlock) -> AppResult<ResponseEndBlock> {
        let height = self.block.height;
        let params = self.registry.params().clone();

        let mut accumulated = self.award_accumulator()?;
        accumulated += block_subsidy(height, params.inflation_rate);
        accumulated += self.bridge.take_block_fees();

        self.bridge.apply_deferred();

        let byzantine = std::mem::take(&mut self.block.byzantine);
        let retiring = self.governance.retiring_validators(height);
        let mut epoch_updates: Vec<ValidatorUpdate> = Vec::new();
        {
            let mut ledger = self.bridge.deliver_ledger();

            for pk in &byzantine {
                self.staking.punish_byzantine(pk, height, &params, &mut ledger)?;
            }
            self.staking
                .punish_absent_validators(height, &params, &mut ledger)?;

            if params.is_vp_epoch(height) {
                let (distributed, awards) =
                    self.staking
                        .distribute_rewards(height, &accumulated, &params, &mut ledger)?;
                accumulated -= &distributed;
                let json = serde_json::to_vec(&awards)
                    .map_err(|e| AppError::corrupt(AWARD_INFO_KEY, e))?;
                self.native.set(AWARD_INFO_KEY, json);
                if retiring.is_none() {
                    epoch_updates = self.staking.update_validator_set(height, &params)?;
                }
            }
            if let Some(preserved) = &retiring {
                epoch_updates = self.staking.retire_validators(preserved)?;
            }

            self.staking.complete_unstake_requests(height, &mut ledger)?;
            self.staking.accumulate_staking_dates(height, &params)?;
            self.staking.snapshot_daily_stakes(height, &params)?;

            let mut fx = Effects {
                registry: &mut self.registry,
                program: &mut *self.program,
                ledger: &mut ledger,
            };
            let closed = self.governance.end_block(
                height,
                self.block.time,
                self.staking.store(),
                &mut fx,
            )?;
            if !closed.is_empty() {
                info!(height, closed = closed.len(), "Proposals closed");
            }
        }
        let validator_updates = self.staking.end_block_validator_updates(epoch_updates);
        self.bridge.apply_deferred();

        let absent = self
            .staking
            .absent_validators()
            .to_json()
            .map_err(|e| AppError::corrupt(ABSENT_VALIDATORS_KEY, e))?;
        self.native.set(ABSENT_VALIDATORS_KEY, absent);
        self.set_award_accumulator(&accumulated);

        debug!(
            height,
            updates = validator_updates.len(),
            accumulated = %accumulated,
            "Block ended"
        );
        Ok(ResponseEndBlock { validator_updates })
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Persists every substrate and returns the new app root.
    ///
    /// A failed EVM commit discards the block's native changes and slashes
    /// the proposer instead; the root then carries no EVM component.
    pub fn commit_block(&mut self) -> AppResult<Vec<u8>> {
        let height = self.working_height();
        let eth_root = match self.bridge.commit() {
            Ok(root) => root.0.to_vec(),
            Err(e) => {
                error!(height, error = %e, proposer = %self.block.proposer, "EVM commit failed");
                self.rollback_native()?;
                let params = self.registry.params().clone();
                let proposer = self.block.proposer.clone();
                let mut ledger = self.bridge.deliver_ledger();
                self.staking
                    .punish_bad_proposer(&proposer, height, &params, &mut ledger)?;
                Vec::new()
            }
        };

        if self.registry.take_dirty() {
            self.native.set(PARAMS_KEY, self.registry.to_blob()?);
        }

        let native_root = self.native.working_root()?;
        let aux_root = aux_db_root(&[
            self.staking.digest(),
            self.governance.digest(),
            self.scheduled.digest(),
        ]);
        let app_hash = app_root(&eth_root, &native_root.0, &aux_root).to_vec();

        let mut ops = self.staking.commit_ops()?;
        ops.extend(self.governance.commit_ops()?);
        ops.extend(self.scheduled.commit_ops()?);
        ops.push(meta_op(APP_HASH_META, app_hash.clone()));
        self.native.commit(height, ops)?;
        self.last_app_hash = app_hash.clone();

        info!(height, app_hash = %hex::encode(&app_hash), "Block committed");
        Ok(app_hash)
    }
}

/// Stops the node on a storage failure; the state can no longer be trusted.
fn fatal(stage: &str, err: AppError) -> ! {
    error!(stage, error = %err, "Fatal application error");
    panic!("{stage}: {err}");
}

impl<S: WorldState, E: Executor, KV: KeyValueStore> Application for TravisApp<S, E, KV> {
    fn info(&self) -> ResponseInfo {
        self.info_response()
    }

    fn init_chain(&mut self, req: RequestInitChain) -> ResponseInitChain {
        match self.init_chain_state(req) {
            Ok(resp) => resp,
            Err(e) => fatal("InitChain", e),
        }
    }

    fn begin_block(&mut self, req: RequestBeginBlock) {
        if let Err(e) = self.begin_block_state(req) {
            fatal("BeginBlock", e);
        }
    }

    fn check_tx(&mut self, tx: &[u8]) -> ResponseCheckTx {
        match self.check(tx) {
            Ok(gas) => ResponseCheckTx::ok(gas),
            Err(e) if e.is_fatal() => fatal("CheckTx", e),
            Err(e) => ResponseCheckTx::from_error(&e),
        }
    }

    fn deliver_tx(&mut self, tx: &[u8]) -> ResponseDeliverTx {
        match self.deliver(tx) {
            Ok(resp) => resp,
            Err(e) if e.is_fatal() => fatal("DeliverTx", e),
            Err(e) => ResponseDeliverTx::from_error(&e),
        }
    }

    fn end_block(&mut self, req: RequestEndBlock) -> ResponseEndBlock {
        match self.end_block_state(req) {
            Ok(resp) => resp,
            Err(e) => fatal("EndBlock", e),
        }
    }

    fn commit(&mut self) -> ResponseCommit {
        match self.commit_block() {
            Ok(data) => ResponseCommit { data },
            Err(e) => fatal("Commit", e),
        }
    }

    fn query(&self, req: RequestQuery) -> ResponseQuery {
        self.handle_query(req)
    }
}
