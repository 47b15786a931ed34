//! # Governance Store
//!
//! Proposals and votes, journaled together.

use shared_types::{sha256, Address};
use tv_03_native_store::{BatchOperation, Journaled, KeyValueStore, Savepoint, StoreResult, Table};

use crate::domain::{Proposal, Vote};

#[derive(Debug, Clone, Default)]
pub struct GovernanceStore {
    pub(crate) proposals: Table<Proposal>,
    pub(crate) votes: Table<Vote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernanceSavepoint([Savepoint; 2]);

impl GovernanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<KV: KeyValueStore + ?Sized>(kv: &KV) -> StoreResult<Self> {
        Ok(Self {
            proposals: Table::load(kv)?,
            votes: Table::load(kv)?,
        })
    }

    pub fn proposal(&self, id: &str) -> Option<&Proposal> {
        self.proposals.get(&id.to_string())
    }

    /// All proposals ordered by id.
    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.iter()
    }

    /// Proposals without a result, ordered by id.
    pub fn open_proposals(&self) -> Vec<&Proposal> {
        self.proposals.find_by("status", "open")
    }

    pub fn votes_of(&self, proposal_id: &str) -> Vec<&Vote> {
        self.votes.find_by("proposal", proposal_id)
    }

    pub fn vote(&self, proposal_id: &str, voter: &Address) -> Option<&Vote> {
        self.votes
            .find_one_by("pair", &Vote::pair_key(proposal_id, voter))
    }
}

impl Journaled for GovernanceStore {
    type Savepoint = GovernanceSavepoint;

    fn savepoint(&self) -> GovernanceSavepoint {
        GovernanceSavepoint([self.proposals.savepoint(), self.votes.savepoint()])
    }

    fn rollback_to(&mut self, savepoint: GovernanceSavepoint) {
        let [p, v] = savepoint.0;
        self.proposals.rollback_to(p);
        self.votes.rollback_to(v);
    }

    fn commit_ops(&mut self) -> StoreResult<Vec<BatchOperation>> {
        let mut ops = self.proposals.commit_ops()?;
        ops.extend(self.votes.commit_ops()?);
        Ok(ops)
    }

    fn rollback(&mut self) {
        self.proposals.rollback();
        self.votes.rollback();
    }

    fn digest(&self) -> [u8; 32] {
        sha256(&[self.proposals.digest(), self.votes.digest()].concat())
    }
}
