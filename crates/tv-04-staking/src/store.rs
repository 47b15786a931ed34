//! # Staking Store
//!
//! The seven staking tables behind one transactional handle. The store is
//! journaled as a unit: a savepoint covers every table, and a commit yields
//! one batch for all of them.

use shared_types::{sha256, Address, BlockHeight, PubKey};
use tv_03_native_store::{BatchOperation, Journaled, KeyValueStore, Savepoint, StoreResult, Table};

use crate::domain::{
    Candidate, CandidateAccountUpdateRequest, CandidateDailyStake, CandidateId, DelegateHistory,
    Delegation, RequestState, Slash, UnstakeRequest,
};

#[derive(Debug, Clone, Default)]
pub struct StakingStore {
    pub(crate) candidates: Table<Candidate>,
    pub(crate) delegations: Table<Delegation>,
    pub(crate) history: Table<DelegateHistory>,
    pub(crate) slashes: Table<Slash>,
    pub(crate) unstake_requests: Table<UnstakeRequest>,
    pub(crate) daily_stakes: Table<CandidateDailyStake>,
    pub(crate) account_updates: Table<CandidateAccountUpdateRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingSavepoint([Savepoint; 7]);

impl StakingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<KV: KeyValueStore + ?Sized>(kv: &KV) -> StoreResult<Self> {
        Ok(Self {
            candidates: Table::load(kv)?,
            delegations: Table::load(kv)?,
            history: Table::load(kv)?,
            slashes: Table::load(kv)?,
            unstake_requests: Table::load(kv)?,
            daily_stakes: Table::load(kv)?,
            account_updates: Table::load(kv)?,
        })
    }

    // ---- candidates ----

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.get(&id)
    }

    pub fn candidate_by_address(&self, owner: &Address) -> Option<&Candidate> {
        self.candidates.find_one_by("owner", &owner.to_string())
    }

    pub fn candidate_by_pub_key(&self, pub_key: &PubKey) -> Option<&Candidate> {
        self.candidates.find_one_by("pub_key", pub_key.as_str())
    }

    /// All candidates in id order.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    // ---- delegations ----

    pub fn delegation(&self, delegator: &Address, candidate_id: CandidateId) -> Option<&Delegation> {
        self.delegations
            .find_one_by("pair", &Delegation::pair_key(delegator, candidate_id))
    }

    pub fn delegations_of_candidate(&self, candidate_id: CandidateId) -> Vec<&Delegation> {
        self.delegations
            .find_by("candidate", &candidate_id.to_string())
    }

    pub fn delegations_of(&self, delegator: &Address) -> Vec<&Delegation> {
        self.delegations.find_by("delegator", &delegator.to_string())
    }

    pub fn delegations(&self) -> impl Iterator<Item = &Delegation> {
        self.delegations.iter()
    }

    // ---- history, slashes ----

    pub fn history(&self) -> impl Iterator<Item = &DelegateHistory> {
        self.history.iter()
    }

    pub fn slashes_of(&self, candidate_id: CandidateId) -> Vec<&Slash> {
        self.slashes.find_by("candidate", &candidate_id.to_string())
    }

    pub fn slashes(&self) -> impl Iterator<Item = &Slash> {
        self.slashes.iter()
    }

    // ---- unstake requests ----

    pub fn unstake_request(&self, id: u64) -> Option<&UnstakeRequest> {
        self.unstake_requests.get(&id)
    }

    pub fn unstake_requests(&self) -> impl Iterator<Item = &UnstakeRequest> {
        self.unstake_requests.iter()
    }

    /// PENDING requests of `delegator`, optionally limited to one candidate.
    pub fn pending_unstakes_of(
        &self,
        delegator: &Address,
        candidate_id: Option<CandidateId>,
    ) -> Vec<&UnstakeRequest> {
        self.unstake_requests
            .find_by("delegator", &delegator.to_string())
            .into_iter()
            .filter(|r| r.state == RequestState::Pending)
            .filter(|r| candidate_id.map_or(true, |id| r.candidate_id == id))
            .collect()
    }

    /// PENDING requests whose waiting period has elapsed at `height`, oldest first.
    pub fn due_unstake_requests(&self, height: BlockHeight) -> Vec<UnstakeRequest> {
        self.unstake_requests
            .find_by("state", RequestState::Pending.as_str())
            .into_iter()
            .filter(|r| r.performed_block_height <= height)
            .cloned()
            .collect()
    }

    // ---- daily stakes ----

    /// Snapshot amounts of one candidate, oldest first.
    pub fn daily_stakes_of(&self, candidate_id: CandidateId) -> Vec<&CandidateDailyStake> {
        let mut rows = self
            .daily_stakes
            .find_by("candidate", &candidate_id.to_string());
        rows.sort_by_key(|r| (r.block_height, r.id));
        rows
    }

    // ---- account updates ----

    pub fn account_update_request(&self, id: u64) -> Option<&CandidateAccountUpdateRequest> {
        self.account_updates.get(&id)
    }

    fn tables_digest(&self) -> [u8; 32] {
        let digests = [
            self.candidates.digest(),
            self.delegations.digest(),
            self.history.digest(),
            self.slashes.digest(),
            self.unstake_requests.digest(),
            self.daily_stakes.digest(),
            self.account_updates.digest(),
        ];
        sha256(&digests.concat())
    }
}

impl Journaled for StakingStore {
    type Savepoint = StakingSavepoint;

    fn savepoint(&self) -> StakingSavepoint {
        StakingSavepoint([
            self.candidates.savepoint(),
            self.delegations.savepoint(),
            self.history.savepoint(),
            self.slashes.savepoint(),
            self.unstake_requests.savepoint(),
            self.daily_stakes.savepoint(),
            self.account_updates.savepoint(),
        ])
    }

    fn rollback_to(&mut self, savepoint: StakingSavepoint) {
        let [c, d, h, s, u, ds, a] = savepoint.0;
        self.candidates.rollback_to(c);
        self.delegations.rollback_to(d);
        self.history.rollback_to(h);
        self.slashes.rollback_to(s);
        self.unstake_requests.rollback_to(u);
        self.daily_stakes.rollback_to(ds);
        self.account_updates.rollback_to(a);
    }

    fn commit_ops(&mut self) -> StoreResult<Vec<BatchOperation>> {
        let mut ops = self.candidates.commit_ops()?;
        ops.extend(self.delegations.commit_ops()?);
        ops.extend(self.history.commit_ops()?);
        ops.extend(self.slashes.commit_ops()?);
        ops.extend(self.unstake_requests.commit_ops()?);
        ops.extend(self.daily_stakes.commit_ops()?);
        ops.extend(self.account_updates.commit_ops()?);
        Ok(ops)
    }

    fn rollback(&mut self) {
        self.candidates.rollback();
        self.delegations.rollback();
        self.history.rollback();
        self.slashes.rollback();
        self.unstake_requests.rollback();
        self.daily_stakes.rollback();
        self.account_updates.rollback();
    }

    fn digest(&self) -> [u8; 32] {
        self.tables_digest()
    }
}
