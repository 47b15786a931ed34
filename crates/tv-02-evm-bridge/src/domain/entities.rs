//! # Domain Entities
//!
//! Accounts, receipts and block context as seen by the bridge.

use serde::{Deserialize, Serialize};
use shared_types::{amount_serde, Address, Amount, BlockHeight, Hash};

/// State of one EVM account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(with = "amount_serde")]
    pub balance: Amount,
    pub nonce: u64,
    #[serde(default)]
    pub code: Vec<u8>,
}

impl Account {
    pub fn with_balance(balance: Amount) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Empty per EIP-161: zero balance, zero nonce, no code.
    pub fn is_empty(&self) -> bool {
        self.balance == Amount::default() && self.nonce == 0 && self.code.is_empty()
    }
}

/// A log record emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
}

/// A future-dated call requested by a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledCall {
    pub sender: Address,
    pub receiver: Address,
    pub data: Vec<u8>,
    /// Unix seconds at which the call becomes due.
    pub due_time: i64,
}

/// Outcome of executing one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub gas_used: u64,
    /// False when execution reverted; gas is still consumed.
    pub success: bool,
    pub logs: Vec<Log>,
    #[serde(default)]
    pub scheduled: Vec<ScheduledCall>,
}

/// Header fields the executor needs for the block under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    pub height: BlockHeight,
    /// Block time (unix seconds).
    pub time: i64,
    /// Proposer address.
    pub coinbase: Address,
    pub gas_limit: u64,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            height: 0,
            time: 0,
            coinbase: Address::ZERO,
            gas_limit: crate::config::DEFAULT_BLOCK_GAS_LIMIT,
        }
    }
}
