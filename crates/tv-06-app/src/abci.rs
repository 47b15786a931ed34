//! # Consensus-Engine Messages
//!
//! Requests and responses exchanged with the consensus engine, reduced to the
//! fields the application reads or writes.

use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockHeight, ErrorCode, HasErrorCode, PubKey};
use tv_04_staking::ValidatorUpdate;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInitChain {
    pub chain_id: String,
    /// Genesis time (unix seconds).
    pub time: i64,
    /// Validators proposed by the consensus engine; informational only, the
    /// app_state validators are authoritative.
    pub validators: Vec<ValidatorUpdate>,
    pub app_state_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInitChain {
    pub validators: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    pub version: String,
    pub last_block_height: BlockHeight,
    pub last_block_app_hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub chain_id: String,
    pub height: BlockHeight,
    /// Block time (unix seconds).
    pub time: i64,
    /// Consensus key of the proposer.
    pub proposer: PubKey,
    /// Fee recipient of the block.
    pub coinbase: Address,
}

/// Whether a validator signed the previous block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteInfo {
    pub pub_key: PubKey,
    pub signed_last_block: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestBeginBlock {
    pub header: Header,
    pub last_commit_votes: Vec<VoteInfo>,
    /// Validators reported for equivocation.
    pub byzantine_validators: Vec<PubKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCheckTx {
    pub code: u32,
    pub log: String,
    pub gas_wanted: u64,
}

impl ResponseCheckTx {
    pub fn ok(gas_wanted: u64) -> Self {
        Self {
            code: ErrorCode::Ok.as_u32(),
            log: String::new(),
            gas_wanted,
        }
    }

    pub fn from_error<E: HasErrorCode + std::fmt::Display>(err: &E) -> Self {
        Self {
            code: err.code().as_u32(),
            log: err.to_string(),
            gas_wanted: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok.as_u32()
    }
}

/// A typed event attached to a DeliverTx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push((key.into(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDeliverTx {
    pub code: u32,
    pub log: String,
    pub gas_used: u64,
    pub events: Vec<Event>,
}

impl ResponseDeliverTx {
    pub fn from_error<E: HasErrorCode + std::fmt::Display>(err: &E) -> Self {
        Self {
            code: err.code().as_u32(),
            log: err.to_string(),
            gas_used: 0,
            events: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok.as_u32()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestEndBlock {
    pub height: BlockHeight,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCommit {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    pub path: String,
    pub data: Vec<u8>,
    /// Ignored: queries are always answered from the latest committed state.
    pub height: BlockHeight,
    pub prove: bool,
}

impl RequestQuery {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseQuery {
    pub code: u32,
    pub log: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub height: BlockHeight,
}

impl ResponseQuery {
    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok.as_u32()
    }
}
