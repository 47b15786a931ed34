//! # Native Envelope
//!
//! The JSON carried in the `data` of a native-shaped EVM transaction:
//!
//! ```json
//! { "type": "stake/delegate", "data": { "validator_address": "0x…", "amount": "…" } }
//! ```
//!
//! The module prefix of `type` selects the handler; the rest is the
//! operation understood by that handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tv_04_staking::StakeTx;
use tv_05_governance::GovTx;

use crate::errors::{AppError, AppResult};

pub const STAKE_MODULE: &str = "stake";
pub const GOVERNANCE_MODULE: &str = "governance";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AppError::InvalidEnvelope(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| AppError::InvalidEnvelope(e.to_string()))
    }

    /// `(module, operation)` split at the first `/`.
    pub fn route(&self) -> Option<(&str, &str)> {
        self.kind.split_once('/')
    }
}

/// A decoded native transaction, ready for its handler.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeTx {
    Stake(StakeTx),
    Governance(GovTx),
}

impl NativeTx {
    pub fn decode(payload: &[u8]) -> AppResult<Self> {
        Self::from_envelope(&Envelope::from_bytes(payload)?)
    }

    pub fn from_envelope(envelope: &Envelope) -> AppResult<Self> {
        match envelope.route() {
            Some((STAKE_MODULE, op)) => Ok(NativeTx::Stake(StakeTx::decode(op, &envelope.data)?)),
            Some((GOVERNANCE_MODULE, op)) => {
                Ok(NativeTx::Governance(GovTx::decode(op, &envelope.data)?))
            }
            _ => Err(AppError::UnknownTxType(envelope.kind.clone())),
        }
    }

    /// Full `module/op` name.
    pub fn kind(&self) -> String {
        match self {
            NativeTx::Stake(tx) => format!("{STAKE_MODULE}/{}", tx.op()),
            NativeTx::Governance(tx) => format!("{GOVERNANCE_MODULE}/{}", tx.op()),
        }
    }
}
