//! # Deferred Transfer Queue
//!
//! Balance movements enqueued by native handlers during DeliverTx and applied
//! against the working EVM state at EndBlock, in insertion order.

use num_traits::Zero;
use shared_types::{Address, Amount, Transfer};

#[derive(Debug, Clone, Default)]
pub struct DeferredTransfers {
    queue: Vec<Transfer>,
}

impl DeferredTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transfer: Transfer) {
        self.queue.push(transfer);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Marks the current queue length so a failed tx can drop its transfers.
    pub fn savepoint(&self) -> usize {
        self.queue.len()
    }

    pub fn truncate(&mut self, savepoint: usize) {
        self.queue.truncate(savepoint);
    }

    /// Total amount queued to leave `address`.
    pub fn outgoing(&self, address: &Address) -> Amount {
        self.queue
            .iter()
            .filter(|t| &t.from == address)
            .fold(Amount::zero(), |acc, t| acc + &t.amount)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transfer> {
        self.queue.iter()
    }

    /// Removes and returns every queued transfer in insertion order.
    pub fn drain(&mut self) -> Vec<Transfer> {
        std::mem::take(&mut self.queue)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
