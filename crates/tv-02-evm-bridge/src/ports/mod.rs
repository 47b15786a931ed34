//! # Driven Ports
//!
//! The bridge depends on two collaborators it does not implement: the EVM
//! world state and the interpreter. Adapters plug in a real trie and EVM; the
//! crate ships in-memory versions for tests and single-process use.

use num_traits::Zero;
use shared_types::{Address, Amount, Hash};

use crate::domain::{Account, BlockContext, EthTransaction, Receipt, ScheduledCall};
use crate::errors::EvmResult;

/// Journaled EVM world state with a committed head and a working copy.
///
/// Reads through `account` see the working copy; `committed_account` sees the
/// state as of the last `commit`.
pub trait WorldState: Send + Sync {
    /// Working-copy account, `None` if it never existed.
    fn account(&self, address: &Address) -> Option<Account>;

    /// Account as of the last commit.
    fn committed_account(&self, address: &Address) -> Option<Account>;

    fn set_balance(&mut self, address: &Address, balance: Amount);

    fn set_nonce(&mut self, address: &Address, nonce: u64);

    fn set_code(&mut self, address: &Address, code: Vec<u8>);

    /// Opens a journal point; returns its id.
    fn snapshot(&mut self) -> usize;

    /// Undoes every write made after `snapshot` returned `id`.
    fn revert_to(&mut self, id: usize);

    /// Makes the working copy the committed head and returns its root.
    fn commit(&mut self) -> EvmResult<Hash>;

    /// Drops uncommitted writes.
    fn discard(&mut self);

    /// Root of the last committed head.
    fn root(&self) -> Hash;

    fn balance(&self, address: &Address) -> Amount {
        self.account(address)
            .map(|a| a.balance)
            .unwrap_or_else(Amount::zero)
    }

    fn nonce(&self, address: &Address) -> u64 {
        self.account(address).map(|a| a.nonce).unwrap_or(0)
    }

    fn exists(&self, address: &Address) -> bool {
        self.account(address).is_some()
    }

    fn has_code(&self, address: &Address) -> bool {
        self.account(address)
            .map(|a| !a.code.is_empty())
            .unwrap_or(false)
    }

    fn add_balance(&mut self, address: &Address, amount: &Amount) {
        let balance = self.balance(address) + amount;
        self.set_balance(address, balance);
    }

    fn sub_balance(&mut self, address: &Address, amount: &Amount) {
        let balance = self.balance(address) - amount;
        self.set_balance(address, balance);
    }
}

/// Executes transactions against a world state.
///
/// The bridge has already checked signature, nonce, intrinsic gas and the
/// sender's ability to pay `cost()`. The executor buys gas, bumps the nonce,
/// runs the call and refunds unused gas.
pub trait Executor: Send + Sync {
    fn execute(
        &self,
        state: &mut dyn WorldState,
        tx: &EthTransaction,
        ctx: &BlockContext,
    ) -> EvmResult<Receipt>;

    /// Runs a previously scheduled call. `parent` identifies the scheduled
    /// entry for the receipt.
    fn execute_scheduled(
        &self,
        state: &mut dyn WorldState,
        call: &ScheduledCall,
        parent: Hash,
        ctx: &BlockContext,
    ) -> EvmResult<Receipt>;
}
