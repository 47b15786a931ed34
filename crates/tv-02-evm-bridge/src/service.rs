//! # EVM Bridge Service
//!
//! Presents the EVM world state to the rest of the application.
//!
//! ## Two views of state
//!
//! - **Check view**: the committed head plus a mempool overlay. CheckTx
//!   debits the overlay so consecutive txs from one sender see each other.
//!   The overlay is dropped at every Commit.
//! - **Deliver view**: the working copy owned by the block under
//!   construction. DeliverTx executes against it; native handlers read it
//!   net of the deferred transfer queue and enqueue their own transfers.
//!
//! ## Native transactions
//!
//! Native envelopes ride in EVM transactions but never reach the executor.
//! The bridge only checks and advances their nonce; the router runs the
//! handler against a [`CheckView`] or a [`DeliverLedger`].

use num_bigint::BigInt;
use num_traits::Zero;
use shared_types::{
    Address, Amount, BalanceView, Hash, Transfer, TransferSink, MINT_ACCOUNT,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};
use tv_01_params::Params;

use crate::config::EvmBridgeConfig;
use crate::domain::{
    Account, BlockContext, DeferredTransfers, EthTransaction, LowPriceTracker, Receipt,
    ScheduledCall,
};
use crate::errors::{EvmError, EvmResult};
use crate::ports::{Executor, WorldState};

/// Counters for the bridge.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BridgeStats {
    pub checked: u64,
    pub check_rejected: u64,
    pub delivered: u64,
    pub deliver_failed: u64,
    pub native_delivered: u64,
    pub deferred_applied: u64,
    pub deferred_skipped: u64,
}

/// The EVM bridge.
pub struct EvmBridge<S: WorldState, E: Executor> {
    config: EvmBridgeConfig,
    state: S,
    executor: E,
    /// Mempool overlay over the committed head.
    check_overlay: BTreeMap<Address, Account>,
    check_low_price: LowPriceTracker,
    deliver_low_price: LowPriceTracker,
    /// Txs rejected in the check path per sender; widens the nonce window.
    check_failed_count: HashMap<Address, u64>,
    /// Hashes whose nonce was already checked and advanced in the check path.
    nonce_checked: HashSet<Hash>,
    /// Signers with a native tx admitted in the current block.
    native_signers: HashSet<Address>,
    deferred: DeferredTransfers,
    block: BlockContext,
    block_gas_used: u64,
    block_fees: Amount,
    stats: BridgeStats,
}

impl<S: WorldState, E: Executor> EvmBridge<S, E> {
    pub fn new(config: EvmBridgeConfig, state: S, executor: E) -> Self {
        Self {
            config,
            state,
            executor,
            check_overlay: BTreeMap::new(),
            check_low_price: LowPriceTracker::new(),
            deliver_low_price: LowPriceTracker::new(),
            check_failed_count: HashMap::new(),
            nonce_checked: HashSet::new(),
            native_signers: HashSet::new(),
            deferred: DeferredTransfers::new(),
            block: BlockContext::default(),
            block_gas_used: 0,
            block_fees: Amount::zero(),
            stats: BridgeStats::default(),
        }
    }

    pub fn config(&self) -> &EvmBridgeConfig {
        &self.config
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn block(&self) -> &BlockContext {
        &self.block
    }

    /// Working-copy balance.
    pub fn balance(&self, address: &Address) -> Amount {
        self.state.balance(address)
    }

    /// Working-copy nonce.
    pub fn nonce(&self, address: &Address) -> u64 {
        self.state.nonce(address)
    }

    pub fn committed_balance(&self, address: &Address) -> Amount {
        self.state
            .committed_account(address)
            .map(|a| a.balance)
            .unwrap_or_else(Amount::zero)
    }

    /// Last committed world-state root.
    pub fn root(&self) -> Hash {
        self.state.root()
    }

    /// Credits a genesis balance into the working copy.
    pub fn fund_genesis_account(&mut self, address: &Address, amount: &Amount) {
        self.state.add_balance(address, amount);
    }

    // =========================================================================
    // DECODING
    // =========================================================================

    /// Decodes raw bytes and enforces size and chain-id rules.
    pub fn decode(&self, raw: &[u8]) -> EvmResult<EthTransaction> {
        if raw.len() > self.config.max_tx_size {
            return Err(EvmError::TxTooLarge {
                size: raw.len(),
                max: self.config.max_tx_size,
            });
        }
        let tx = EthTransaction::decode(raw)?;
        match tx.chain_id {
            Some(id) if id > 0 && id == self.config.chain_id => Ok(tx),
            actual => Err(EvmError::InvalidChainId {
                expected: self.config.chain_id,
                actual,
            }),
        }
    }

    // =========================================================================
    // BLOCK LIFECYCLE
    // =========================================================================

    pub fn begin_block(&mut self, ctx: BlockContext) {
        debug!(height = ctx.height, time = ctx.time, "Bridge begin block");
        self.block = ctx;
        self.block_gas_used = 0;
        self.block_fees = Amount::zero();
        self.deliver_low_price.reset();
    }

    /// Applies the deferred queue to the working copy in insertion order.
    /// Transfers whose source cannot cover them are skipped.
    pub fn apply_deferred(&mut self) -> Vec<Transfer> {
        let mut applied = Vec::new();
        for transfer in self.deferred.drain() {
            if transfer.from != MINT_ACCOUNT {
                let balance = self.state.balance(&transfer.from);
                if balance < transfer.amount {
                    warn!(
                        from = %transfer.from,
                        to = %transfer.to,
                        amount = %transfer.amount,
                        balance = %balance,
                        "Skipping deferred transfer: insufficient balance"
                    );
                    self.stats.deferred_skipped += 1;
                    continue;
                }
                self.state.sub_balance(&transfer.from, &transfer.amount);
            }
            if transfer.to != MINT_ACCOUNT {
                self.state.add_balance(&transfer.to, &transfer.amount);
            }
            self.stats.deferred_applied += 1;
            applied.push(transfer);
        }
        applied
    }

    /// Commits the working copy. Block-scoped caches are reset whether or not
    /// the commit succeeds; on failure the working copy is discarded.
    pub fn commit(&mut self) -> EvmResult<Hash> {
        if !self.deferred.is_empty() {
            warn!(
                pending = self.deferred.len(),
                "Dropping deferred transfers not applied before commit"
            );
            self.deferred.clear();
        }
        let result = self.state.commit();
        if result.is_err() {
            self.state.discard();
        }
        self.reset_block_caches();
        if let Ok(root) = &result {
            info!(height = self.block.height, root = %root, "EVM state committed");
        }
        result
    }

    /// Drops the working copy and all block-scoped caches.
    pub fn discard(&mut self) {
        self.state.discard();
        self.deferred.clear();
        self.reset_block_caches();
    }

    fn reset_block_caches(&mut self) {
        self.check_overlay.clear();
        self.check_low_price.reset();
        self.deliver_low_price.reset();
        self.nonce_checked.clear();
        self.native_signers.clear();
    }

    // =========================================================================
    // FEES
    // =========================================================================

    /// Adds a native gas fee to the block accumulator.
    pub fn add_fee(&mut self, fee: &Amount) {
        self.block_fees += fee;
    }

    pub fn block_fees(&self) -> &Amount {
        &self.block_fees
    }

    /// Returns and resets the block fee accumulator.
    pub fn take_block_fees(&mut self) -> Amount {
        std::mem::take(&mut self.block_fees)
    }

    // =========================================================================
    // CHECK PATH
    // =========================================================================

    fn check_account(&self, address: &Address) -> Option<Account> {
        self.check_overlay
            .get(address)
            .cloned()
            .or_else(|| self.state.committed_account(address))
    }

    fn check_account_mut(&mut self, address: &Address) -> &mut Account {
        if !self.check_overlay.contains_key(address) {
            let base = self.state.committed_account(address).unwrap_or_default();
            self.check_overlay.insert(*address, base);
        }
        self.check_overlay.entry(*address).or_default()
    }

    /// Checks shared by EVM and native txs: sender exists, gas within the
    /// block limit and the nonce rule. Returns the sender's account.
    fn basic_check(&self, tx: &EthTransaction) -> EvmResult<Account> {
        let account = self
            .check_account(&tx.sender)
            .ok_or(EvmError::UnknownAccount(tx.sender))?;

        if tx.gas_limit > self.config.block_gas_limit {
            return Err(EvmError::BlockGasLimit {
                gas: tx.gas_limit,
                limit: self.config.block_gas_limit,
            });
        }

        if !self.nonce_checked.contains(&tx.hash) && tx.nonce != account.nonce {
            let failed = self.check_failed_count.get(&tx.sender).copied().unwrap_or(0);
            let tolerated = self.config.nonce_tolerance
                && failed > 0
                && tx.nonce == account.nonce + failed;
            if !tolerated {
                return Err(EvmError::BadNonce {
                    expected: account.nonce,
                    actual: tx.nonce,
                });
            }
        }
        Ok(account)
    }

    /// Mempool validation of an EVM tx. Returns the gas wanted.
    pub fn check_tx(&mut self, tx: &EthTransaction, params: &Params) -> EvmResult<u64> {
        let result = self.check_evm(tx, params);
        match &result {
            Ok(_) => self.stats.checked += 1,
            Err(e) => {
                self.stats.check_rejected += 1;
                debug!(hash = %tx.hash, sender = %tx.sender, error = %e, "CheckTx rejected");
            }
        }
        result
    }

    fn check_evm(&mut self, tx: &EthTransaction, params: &Params) -> EvmResult<u64> {
        let account = self.basic_check(tx)?;

        if self.native_signers.contains(&tx.sender) {
            return Err(EvmError::PendingNativeTx(tx.sender));
        }

        let (callee_has_code, callee_balance) = match tx.to.and_then(|to| self.check_account(&to)) {
            Some(callee) => (!callee.code.is_empty(), callee.balance),
            None => (false, Amount::zero()),
        };
        let payer = tx
            .gas_payer(&account.balance, callee_has_code, &callee_balance)
            .ok_or_else(|| EvmError::InsufficientFunds {
                balance: account.balance.clone(),
                cost: tx.cost(),
            })?;

        let required = tx.intrinsic_gas();
        if tx.gas_limit < required {
            return Err(EvmError::IntrinsicGas {
                gas: tx.gas_limit,
                required,
            });
        }

        if let Err(e) =
            self.check_low_price
                .admit(tx.sender, tx.to, &tx.gas_price, tx.gas_limit, params)
        {
            if e == EvmError::LowGasPrice {
                *self.check_failed_count.entry(tx.sender).or_insert(0) += 1;
            }
            return Err(e);
        }

        self.nonce_checked.insert(tx.hash);

        let gas_cost = BigInt::from(tx.gas_limit) * &tx.gas_price;
        self.check_account_mut(&payer).balance -= &gas_cost;
        let sender = self.check_account_mut(&tx.sender);
        sender.balance -= &tx.value;
        sender.nonce = account.nonce + 1;
        if let Some(to) = tx.to {
            self.check_account_mut(&to).balance += &tx.value;
        }

        Ok(tx.gas_limit)
    }

    /// Nonce and account checks for a native tx in the mempool.
    pub fn check_native(&self, tx: &EthTransaction) -> EvmResult<()> {
        self.basic_check(tx).map(|_| ())
    }

    /// Records an admitted native tx: advances the overlay nonce once and
    /// blocks further EVM txs from the signer until Commit.
    pub fn accept_native_check(&mut self, tx: &EthTransaction) {
        if self.nonce_checked.insert(tx.hash) {
            let account = self.check_account_mut(&tx.sender);
            account.nonce += 1;
        }
        self.native_signers.insert(tx.sender);
        self.stats.checked += 1;
    }

    /// Balance view over the check overlay.
    pub fn check_view(&self) -> CheckView<'_, S, E> {
        CheckView { bridge: self }
    }

    // =========================================================================
    // DELIVER PATH
    // =========================================================================

    /// Executes an EVM tx against the working copy.
    pub fn deliver_tx(&mut self, tx: &EthTransaction, params: &Params) -> EvmResult<Receipt> {
        let result = self.deliver_evm(tx, params);
        match &result {
            Ok(receipt) => {
                self.stats.delivered += 1;
                debug!(hash = %tx.hash, gas_used = receipt.gas_used, success = receipt.success, "DeliverTx executed");
            }
            Err(e) => {
                self.stats.deliver_failed += 1;
                debug!(hash = %tx.hash, error = %e, "DeliverTx rejected");
            }
        }
        result
    }

    fn deliver_evm(&mut self, tx: &EthTransaction, params: &Params) -> EvmResult<Receipt> {
        let expected = self.state.nonce(&tx.sender);
        if tx.nonce != expected {
            return Err(EvmError::BadNonce {
                expected,
                actual: tx.nonce,
            });
        }
        let required = tx.intrinsic_gas();
        if tx.gas_limit < required {
            return Err(EvmError::IntrinsicGas {
                gas: tx.gas_limit,
                required,
            });
        }
        let available = self.block.gas_limit.min(self.config.block_gas_limit);
        if self.block_gas_used.saturating_add(tx.gas_limit) > available {
            return Err(EvmError::BlockGasLimit {
                gas: tx.gas_limit,
                limit: available - self.block_gas_used.min(available),
            });
        }

        self.deliver_low_price
            .admit(tx.sender, tx.to, &tx.gas_price, tx.gas_limit, params)?;

        let snapshot = self.state.snapshot();
        let receipt = match self.executor.execute(&mut self.state, tx, &self.block) {
            Ok(receipt) => receipt,
            Err(e) => {
                self.state.revert_to(snapshot);
                return Err(e);
            }
        };

        self.block_gas_used += receipt.gas_used;
        self.block_fees += BigInt::from(receipt.gas_used) * &tx.gas_price;
        Ok(receipt)
    }

    /// Deliver-path nonce rule for a native tx: exact match against the
    /// working copy.
    pub fn check_native_deliver(&self, tx: &EthTransaction) -> EvmResult<()> {
        if !self.state.exists(&tx.sender) {
            return Err(EvmError::UnknownAccount(tx.sender));
        }
        let expected = self.state.nonce(&tx.sender);
        if tx.nonce != expected {
            return Err(EvmError::BadNonce {
                expected,
                actual: tx.nonce,
            });
        }
        Ok(())
    }

    /// Advances the signer's nonce after a native handler succeeded.
    pub fn finish_native_deliver(&mut self, tx: &EthTransaction) {
        let nonce = self.state.nonce(&tx.sender);
        self.state.set_nonce(&tx.sender, nonce + 1);
        self.stats.native_delivered += 1;
    }

    /// Ledger over the working copy and the deferred queue.
    pub fn deliver_ledger(&mut self) -> DeliverLedger<'_, S> {
        DeliverLedger {
            state: &self.state,
            deferred: &mut self.deferred,
        }
    }

    pub fn deferred(&self) -> &DeferredTransfers {
        &self.deferred
    }

    pub fn deferred_savepoint(&self) -> usize {
        self.deferred.savepoint()
    }

    /// Drops transfers queued after `savepoint` (failed native tx).
    pub fn rollback_deferred(&mut self, savepoint: usize) {
        self.deferred.truncate(savepoint);
    }

    /// Runs a scheduled call against the working copy; a failed call leaves
    /// no trace in state.
    pub fn execute_scheduled(&mut self, call: &ScheduledCall, parent: Hash) -> EvmResult<Receipt> {
        let snapshot = self.state.snapshot();
        match self
            .executor
            .execute_scheduled(&mut self.state, call, parent, &self.block)
        {
            Ok(receipt) => {
                if !receipt.success {
                    self.state.revert_to(snapshot);
                }
                Ok(receipt)
            }
            Err(e) => {
                self.state.revert_to(snapshot);
                Err(e)
            }
        }
    }
}

/// Read-only balances as the mempool sees them.
pub struct CheckView<'a, S: WorldState, E: Executor> {
    bridge: &'a EvmBridge<S, E>,
}

impl<S: WorldState, E: Executor> BalanceView for CheckView<'_, S, E> {
    fn balance(&self, address: &Address) -> Amount {
        self.bridge
            .check_account(address)
            .map(|a| a.balance)
            .unwrap_or_else(Amount::zero)
    }
}

/// Balances net of queued transfers, plus the queue itself.
pub struct DeliverLedger<'a, S: WorldState> {
    state: &'a S,
    deferred: &'a mut DeferredTransfers,
}

impl<S: WorldState> BalanceView for DeliverLedger<'_, S> {
    fn balance(&self, address: &Address) -> Amount {
        self.state.balance(address) - self.deferred.outgoing(address)
    }
}

impl<S: WorldState> TransferSink for DeliverLedger<'_, S> {
    fn defer_transfer(&mut self, transfer: Transfer) {
        debug!(from = %transfer.from, to = %transfer.to, amount = %transfer.amount, "Deferred transfer queued");
        self.deferred.push(transfer);
    }
}
