//! # Scheduled Transactions
//!
//! Future-dated calls requested by contracts during execution. Each one is
//! stored under the RIPEMD-160 of its canonical fields and replayed once the
//! block clock reaches its due time.

use serde::{Deserialize, Serialize};
use shared_types::{ripemd160, Address, BlockHeight, CanonicalEncoder, Hash};
use tv_02_evm_bridge::ScheduledCall;
use tv_03_native_store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Done,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Done => "done",
            ScheduleStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTx {
    /// Lowercase hex RIPEMD-160 of the canonical fields.
    pub hash: String,
    pub parent_tx_hash: Hash,
    pub sender: Address,
    pub receiver: Address,
    pub data: Vec<u8>,
    /// Unix seconds.
    pub due_time: i64,
    pub status: ScheduleStatus,
    pub block_height: BlockHeight,
    #[serde(default)]
    pub executed_height: Option<BlockHeight>,
}

impl ScheduledTx {
    pub fn new(parent: Hash, call: &ScheduledCall, height: BlockHeight) -> Self {
        let digest = ripemd160(
            &CanonicalEncoder::new()
                .hash(&parent)
                .address(&call.sender)
                .address(&call.receiver)
                .bytes(&call.data)
                .i64(call.due_time)
                .finish(),
        );
        Self {
            hash: hex::encode(digest),
            parent_tx_hash: parent,
            sender: call.sender,
            receiver: call.receiver,
            data: call.data.clone(),
            due_time: call.due_time,
            status: ScheduleStatus::Pending,
            block_height: height,
            executed_height: None,
        }
    }

    pub fn call(&self) -> ScheduledCall {
        ScheduledCall {
            sender: self.sender,
            receiver: self.receiver,
            data: self.data.clone(),
            due_time: self.due_time,
        }
    }

    pub fn is_due(&self, block_time: i64) -> bool {
        self.status == ScheduleStatus::Pending && self.due_time <= block_time
    }
}

impl Record for ScheduledTx {
    const TABLE: &'static str = "schedule_tx";
    type Key = String;

    fn key(&self) -> String {
        self.hash.clone()
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![("status", self.status.as_str().to_string())]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let enc = CanonicalEncoder::new()
            .str(&self.hash)
            .hash(&self.parent_tx_hash)
            .address(&self.sender)
            .address(&self.receiver)
            .bytes(&self.data)
            .i64(self.due_time)
            .str(self.status.as_str())
            .i64(self.block_height);
        match self.executed_height {
            Some(h) => enc.bool(true).i64(h),
            None => enc.bool(false),
        }
        .finish()
    }
}
