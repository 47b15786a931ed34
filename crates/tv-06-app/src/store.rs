//! # Scheduled-Transaction Store

use shared_types::BlockHeight;
use tracing::debug;
use tv_03_native_store::{
    BatchOperation, Journaled, KeyValueStore, Savepoint, StoreResult, Table,
};

use crate::domain::{ScheduleStatus, ScheduledTx};

#[derive(Debug, Clone, Default)]
pub struct ScheduledStore {
    table: Table<ScheduledTx>,
}

impl ScheduledStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<KV: KeyValueStore + ?Sized>(kv: &KV) -> StoreResult<Self> {
        Ok(Self {
            table: Table::load(kv)?,
        })
    }

    pub fn get(&self, hash: &str) -> Option<&ScheduledTx> {
        self.table.get(&hash.to_string())
    }

    pub fn pending(&self) -> Vec<&ScheduledTx> {
        self.table.find_by("status", ScheduleStatus::Pending.as_str())
    }

    /// Stores `tx` unless an identical call is already recorded.
    pub fn schedule(&mut self, tx: ScheduledTx) -> StoreResult<bool> {
        if self.table.contains(&tx.hash) {
            debug!(hash = %tx.hash, "Scheduled call already recorded");
            return Ok(false);
        }
        self.table.insert(tx)?;
        Ok(true)
    }

    /// Pending entries due at `block_time`, ordered by (due time, hash).
    pub fn due(&self, block_time: i64) -> Vec<ScheduledTx> {
        let mut due: Vec<ScheduledTx> = self
            .pending()
            .into_iter()
            .filter(|tx| tx.is_due(block_time))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_time.cmp(&b.due_time).then_with(|| a.hash.cmp(&b.hash)));
        due
    }

    pub fn finish(
        &mut self,
        mut tx: ScheduledTx,
        status: ScheduleStatus,
        height: BlockHeight,
    ) -> StoreResult<()> {
        tx.status = status;
        tx.executed_height = Some(height);
        self.table.update(tx)
    }
}

impl Journaled for ScheduledStore {
    type Savepoint = Savepoint;

    fn savepoint(&self) -> Savepoint {
        self.table.savepoint()
    }

    fn rollback_to(&mut self, savepoint: Savepoint) {
        self.table.rollback_to(savepoint);
    }

    fn commit_ops(&mut self) -> StoreResult<Vec<BatchOperation>> {
        self.table.commit_ops()
    }

    fn rollback(&mut self) {
        self.table.rollback();
    }

    fn digest(&self) -> [u8; 32] {
        self.table.digest()
    }
}
