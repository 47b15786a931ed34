//! Transaction routing for CheckTx and DeliverTx.
//!
//! A native-shaped transaction (no recipient, zero value, zero gas, JSON
//! payload) goes to its module handler; everything else goes to the EVM.

use tracing::debug;
use tv_02_evm_bridge::{EthTransaction, Executor, WorldState};
use tv_03_native_store::{Journaled, KeyValueStore};
use tv_04_staking::TxOutcome;
use tv_05_governance::Effects;

use super::TravisApp;
use crate::abci::{Event, ResponseDeliverTx};
use crate::domain::{NativeTx, ScheduledTx};
use crate::errors::AppResult;

impl<S: WorldState, E: Executor, KV: KeyValueStore> TravisApp<S, E, KV> {
    // =========================================================================
    // CHECK
    // =========================================================================

    /// Admission check against the mempool overlay; returns the gas wanted.
    pub fn check(&mut self, raw: &[u8]) -> AppResult<u64> {
        let tx = self.bridge.decode(raw)?;
        if !tx.is_native() {
            return Ok(self.bridge.check_tx(&tx, self.registry.params())?);
        }

        self.bridge.check_native(&tx)?;
        let native = NativeTx::decode(&tx.data)?;
        let ctx = self.tx_context(&tx);
        let params = self.registry.params();
        let outcome = {
            let view = self.bridge.check_view();
            match &native {
                NativeTx::Stake(stx) => self.staking.check(stx, &ctx, params, &view)?,
                NativeTx::Governance(gtx) => {
                    self.governance
                        .check(gtx, &ctx, self.staking.store(), params, &view)?
                }
            }
        };
        self.bridge.accept_native_check(&tx);
        debug!(kind = %native.kind(), sender = %tx.sender, gas = outcome.gas_used, "Native tx admitted");
        Ok(outcome.gas_used)
    }

    // =========================================================================
    // DELIVER
    // =========================================================================

    pub fn deliver(&mut self, raw: &[u8]) -> AppResult<ResponseDeliverTx> {
        let tx = self.bridge.decode(raw)?;
        if tx.is_native() {
            self.deliver_native(&tx)
        } else {
            self.deliver_evm(&tx)
        }
    }

    fn deliver_evm(&mut self, tx: &EthTransaction) -> AppResult<ResponseDeliverTx> {
        let receipt = self.bridge.deliver_tx(tx, self.registry.params())?;
        let height = self.block.height;
        for call in &receipt.scheduled {
            let scheduled = ScheduledTx::new(tx.hash, call, height);
            debug!(hash = %scheduled.hash, due_time = call.due_time, "Scheduled call recorded");
            self.scheduled.schedule(scheduled)?;
        }

        let event = Event::new("evm")
            .attr("sender", tx.sender)
            .attr("hash", tx.hash)
            .attr("status", if receipt.success { "success" } else { "reverted" })
            .attr("scheduled", receipt.scheduled.len());
        Ok(ResponseDeliverTx {
            gas_used: receipt.gas_used,
            events: vec![event],
            ..ResponseDeliverTx::default()
        })
    }

    /// Runs a native handler inside a savepoint; a failed handler leaves no
    /// trace in any substrate.
    fn deliver_native(&mut self, tx: &EthTransaction) -> AppResult<ResponseDeliverTx> {
        self.bridge.check_native_deliver(tx)?;
        let native = NativeTx::decode(&tx.data)?;
        let ctx = self.tx_context(tx);

        let staking_sp = self.staking.savepoint();
        let governance_sp = self.governance.savepoint();
        let scheduled_sp = self.scheduled.savepoint();
        let deferred_sp = self.bridge.deferred_savepoint();
        let registry = match &native {
            NativeTx::Governance(_) => Some(self.registry.clone()),
            NativeTx::Stake(_) => None,
        };

        let result: AppResult<TxOutcome> = match &native {
            NativeTx::Stake(stx) => {
                let mut ledger = self.bridge.deliver_ledger();
                self.staking
                    .deliver(stx, &ctx, self.registry.params(), &mut ledger)
                    .map_err(Into::into)
            }
            NativeTx::Governance(gtx) => {
                let mut ledger = self.bridge.deliver_ledger();
                let mut fx = Effects {
                    registry: &mut self.registry,
                    program: &mut *self.program,
                    ledger: &mut ledger,
                };
                self.governance
                    .deliver(gtx, &ctx, &tx.hash, self.staking.store(), &mut fx)
                    .map_err(Into::into)
            }
        };

        match result {
            Ok(outcome) => {
                self.bridge.finish_native_deliver(tx);
                self.bridge.add_fee(&outcome.gas_fee);
                let event = Event::new(native.kind())
                    .attr("sender", tx.sender)
                    .attr("hash", tx.hash);
                Ok(ResponseDeliverTx {
                    gas_used: outcome.gas_used,
                    events: vec![event],
                    ..ResponseDeliverTx::default()
                })
            }
            Err(e) => {
                self.staking.rollback_to(staking_sp);
                self.governance.rollback_to(governance_sp);
                self.scheduled.rollback_to(scheduled_sp);
                self.bridge.rollback_deferred(deferred_sp);
                if let Some(registry) = registry {
                    self.registry = registry;
                }
                debug!(kind = %native.kind(), sender = %tx.sender, error = %e, "Native tx failed");
                Err(e)
            }
        }
    }
}
