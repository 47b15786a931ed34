//! # In-Memory World State
//!
//! Account map with a write journal for snapshots. The root is Keccak-256 over
//! the canonical encoding of every non-empty account in address order.

use sha3::{Digest, Keccak256};
use shared_types::{Address, Amount, CanonicalEncoder, Hash};
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::domain::Account;
use crate::errors::{EvmError, EvmResult};
use crate::ports::WorldState;

#[derive(Debug, Clone)]
pub struct InMemoryWorldState {
    committed: BTreeMap<Address, Account>,
    working: BTreeMap<Address, Account>,
    journal: Vec<(Address, Option<Account>)>,
    root: Hash,
    fail_next_commit: bool,
}

impl Default for InMemoryWorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorldState {
    pub fn new() -> Self {
        let committed = BTreeMap::new();
        let root = state_root(&committed);
        Self {
            working: committed.clone(),
            committed,
            journal: Vec::new(),
            root,
            fail_next_commit: false,
        }
    }

    /// A committed head holding the given balances.
    pub fn with_balances<I>(balances: I) -> Self
    where
        I: IntoIterator<Item = (Address, Amount)>,
    {
        let committed: BTreeMap<Address, Account> = balances
            .into_iter()
            .map(|(address, balance)| (address, Account::with_balance(balance)))
            .collect();
        let root = state_root(&committed);
        Self {
            working: committed.clone(),
            committed,
            journal: Vec::new(),
            root,
            fail_next_commit: false,
        }
    }

    /// Makes the next `commit` fail as a storage backend would.
    pub fn fail_next_commit(&mut self) {
        self.fail_next_commit = true;
    }

    pub fn account_count(&self) -> usize {
        self.working.len()
    }

    fn entry(&mut self, address: &Address) -> &mut Account {
        self.journal
            .push((*address, self.working.get(address).cloned()));
        self.working.entry(*address).or_default()
    }
}

impl WorldState for InMemoryWorldState {
    fn account(&self, address: &Address) -> Option<Account> {
        self.working.get(address).cloned()
    }

    fn committed_account(&self, address: &Address) -> Option<Account> {
        self.committed.get(address).cloned()
    }

    fn set_balance(&mut self, address: &Address, balance: Amount) {
        self.entry(address).balance = balance;
    }

    fn set_nonce(&mut self, address: &Address, nonce: u64) {
        self.entry(address).nonce = nonce;
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        self.entry(address).code = code;
    }

    fn snapshot(&mut self) -> usize {
        self.journal.len()
    }

    fn revert_to(&mut self, id: usize) {
        while self.journal.len() > id {
            let Some((address, previous)) = self.journal.pop() else {
                break;
            };
            match previous {
                Some(account) => {
                    self.working.insert(address, account);
                }
                None => {
                    self.working.remove(&address);
                }
            }
        }
    }

    fn commit(&mut self) -> EvmResult<Hash> {
        if std::mem::take(&mut self.fail_next_commit) {
            error!("World state commit failed");
            return Err(EvmError::State("commit produced no data".to_string()));
        }
        self.committed = self.working.clone();
        self.journal.clear();
        self.root = state_root(&self.committed);
        debug!(root = %self.root, accounts = self.committed.len(), "World state committed");
        Ok(self.root)
    }

    fn discard(&mut self) {
        self.working = self.committed.clone();
        self.journal.clear();
    }

    fn root(&self) -> Hash {
        self.root
    }
}

fn state_root(accounts: &BTreeMap<Address, Account>) -> Hash {
    let mut hasher = Keccak256::new();
    for (address, account) in accounts.iter().filter(|(_, a)| !a.is_empty()) {
        let code_hash: [u8; 32] = Keccak256::digest(&account.code).into();
        let encoded = CanonicalEncoder::new()
            .address(address)
            .amount(&account.balance)
            .u64(account.nonce)
            .bytes(&code_hash)
            .finish();
        hasher.update(&encoded);
    }
    Hash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    #[test]
    fn test_snapshot_revert_restores_previous_values() {
        let mut state = InMemoryWorldState::with_balances([(addr(1), Amount::from(100))]);
        let sp = state.snapshot();
        state.set_balance(&addr(1), Amount::from(5));
        state.set_nonce(&addr(2), 1);
        state.revert_to(sp);

        assert_eq!(state.balance(&addr(1)), Amount::from(100));
        assert!(!state.exists(&addr(2)));
    }

    #[test]
    fn test_commit_moves_head_and_changes_root() {
        let mut state = InMemoryWorldState::with_balances([(addr(1), Amount::from(100))]);
        let before = state.root();
        state.add_balance(&addr(2), &Amount::from(7));
        assert!(state.committed_account(&addr(2)).is_none());

        let root = state.commit().unwrap();
        assert_ne!(root, before);
        assert_eq!(state.committed_account(&addr(2)).unwrap().balance, Amount::from(7));
    }

    #[test]
    fn test_discard_drops_working_changes() {
        let mut state = InMemoryWorldState::with_balances([(addr(1), Amount::from(100))]);
        state.sub_balance(&addr(1), &Amount::from(40));
        state.discard();
        assert_eq!(state.balance(&addr(1)), Amount::from(100));
    }

    #[test]
    fn test_root_is_order_independent() {
        let mut a = InMemoryWorldState::new();
        a.set_balance(&addr(1), Amount::from(1));
        a.set_balance(&addr(2), Amount::from(2));
        let mut b = InMemoryWorldState::new();
        b.set_balance(&addr(2), Amount::from(2));
        b.set_balance(&addr(1), Amount::from(1));
        assert_eq!(a.commit().unwrap(), b.commit().unwrap());
    }

    #[test]
    fn test_injected_commit_failure() {
        let mut state = InMemoryWorldState::new();
        state.fail_next_commit();
        assert!(state.commit().is_err());
        assert!(state.commit().is_ok());
    }
}
