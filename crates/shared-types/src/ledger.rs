//! # Ledger Ports
//!
//! Native handlers never touch EVM state directly. They read balances through
//! [`BalanceView`] and move value by enqueuing [`Transfer`]s on a
//! [`TransferSink`]; the lifecycle driver applies the queue at EndBlock.

use serde::{Deserialize, Serialize};

use crate::entities::Address;
use crate::numeric::{amount_serde, Amount};

/// Source of newly minted value. Transfers from it never fail for lack of funds.
pub const MINT_ACCOUNT: Address = Address([0u8; 20]);

/// Holds staked funds and collected native gas fees.
pub const HOLD_ACCOUNT: Address = Address([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0x01,
]);

/// Holds funds locked by pending TransferFund proposals.
pub const GOV_HOLD_ACCOUNT: Address = Address([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0x02,
]);

/// A queued balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

impl Transfer {
    pub fn new(from: Address, to: Address, amount: Amount) -> Self {
        Self { from, to, amount }
    }
}

/// Read-only balance lookup.
pub trait BalanceView {
    /// Spendable balance: committed balance minus value already queued out of
    /// the account in this block.
    fn balance(&self, address: &Address) -> Amount;
}

/// Accepts deferred transfers.
pub trait TransferSink {
    fn defer_transfer(&mut self, transfer: Transfer);
}

/// Both halves, as needed by deliver paths.
pub trait Ledger: BalanceView + TransferSink {}

impl<T: BalanceView + TransferSink> Ledger for T {}
