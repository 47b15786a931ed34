//! Governance transaction payloads, the `data` of `governance/<op>`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use shared_types::{parse_amount, Address, Amount, BlockHeight};

use crate::domain::entities::VoteAnswer;
use crate::errors::{GovResult, GovernanceError};

pub const PROPOSE_TRANSFER_FUND: &str = "propose/transferFund";
pub const PROPOSE_CHANGE_PARAM: &str = "propose/changeParam";
pub const PROPOSE_DEPLOY_LIBENI: &str = "propose/deployLibEni";
pub const PROPOSE_RETIRE_PROGRAM: &str = "propose/retireProgram";
pub const PROPOSE_UPGRADE_PROGRAM: &str = "propose/upgradeProgram";
pub const VOTE: &str = "vote";

/// Requested expiry; at most one bound may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expiry {
    pub timestamp: Option<i64>,
    pub block_height: Option<BlockHeight>,
}

#[derive(Debug, Deserialize)]
struct RawTransferFund {
    transfer_from: Address,
    transfer_to: Address,
    amount: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    expire_timestamp: Option<i64>,
    #[serde(default)]
    expire_block_height: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawChangeParam {
    name: String,
    value: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    expire_timestamp: Option<i64>,
    #[serde(default)]
    expire_block_height: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawDeployLibEni {
    name: String,
    version: String,
    file_url: String,
    md5: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    deploy_timestamp: Option<i64>,
    #[serde(default)]
    deploy_block_height: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawRetireProgram {
    #[serde(default)]
    preserved_validators: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    retired_block_height: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawUpgradeProgram {
    name: String,
    version: String,
    file_url: String,
    md5: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    upgrade_block_height: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawVote {
    proposal_id: String,
    answer: String,
}

/// Library description shared by deploy and upgrade proposals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibSpec {
    pub name: String,
    pub version: String,
    pub file_url: String,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GovTx {
    TransferFund {
        from: Address,
        to: Address,
        amount: Amount,
        reason: String,
        expiry: Expiry,
    },
    ChangeParam {
        name: String,
        value: String,
        reason: String,
        expiry: Expiry,
    },
    /// The expiry doubles as the deployment point.
    DeployLibEni {
        lib: LibSpec,
        reason: String,
        expiry: Expiry,
    },
    RetireProgram {
        preserved_validators: String,
        reason: String,
        retired_block_height: Option<BlockHeight>,
    },
    UpgradeProgram {
        lib: LibSpec,
        reason: String,
        upgrade_block_height: Option<BlockHeight>,
    },
    Vote {
        proposal_id: String,
        answer: VoteAnswer,
    },
}

fn payload<T: DeserializeOwned>(data: &Value) -> GovResult<T> {
    serde_json::from_value(data.clone()).map_err(|e| GovernanceError::InvalidPayload(e.to_string()))
}

fn answer(s: &str) -> GovResult<VoteAnswer> {
    match s {
        "Y" => Ok(VoteAnswer::Yes),
        "N" => Ok(VoteAnswer::No),
        other => Err(GovernanceError::InvalidPayload(format!(
            "answer must be Y or N, got {other}"
        ))),
    }
}

impl GovTx {
    /// Decodes the payload of `governance/<op>`.
    pub fn decode(op: &str, data: &Value) -> GovResult<Self> {
        let tx = match op {
            PROPOSE_TRANSFER_FUND => {
                let raw: RawTransferFund = payload(data)?;
                GovTx::TransferFund {
                    from: raw.transfer_from,
                    to: raw.transfer_to,
                    amount: parse_amount(&raw.amount)
                        .map_err(|e| GovernanceError::InvalidPayload(e.to_string()))?,
                    reason: raw.reason,
                    expiry: Expiry {
                        timestamp: raw.expire_timestamp,
                        block_height: raw.expire_block_height,
                    },
                }
            }
            PROPOSE_CHANGE_PARAM => {
                let raw: RawChangeParam = payload(data)?;
                GovTx::ChangeParam {
                    name: raw.name,
                    value: raw.value,
                    reason: raw.reason,
                    expiry: Expiry {
                        timestamp: raw.expire_timestamp,
                        block_height: raw.expire_block_height,
                    },
                }
            }
            PROPOSE_DEPLOY_LIBENI => {
                let raw: RawDeployLibEni = payload(data)?;
                GovTx::DeployLibEni {
                    lib: LibSpec {
                        name: raw.name,
                        version: raw.version,
                        file_url: raw.file_url,
                        md5: raw.md5,
                    },
                    reason: raw.reason,
                    expiry: Expiry {
                        timestamp: raw.deploy_timestamp,
                        block_height: raw.deploy_block_height,
                    },
                }
            }
            PROPOSE_RETIRE_PROGRAM => {
                let raw: RawRetireProgram = payload(data)?;
                GovTx::RetireProgram {
                    preserved_validators: raw.preserved_validators,
                    reason: raw.reason,
                    retired_block_height: raw.retired_block_height,
                }
            }
            PROPOSE_UPGRADE_PROGRAM => {
                let raw: RawUpgradeProgram = payload(data)?;
                GovTx::UpgradeProgram {
                    lib: LibSpec {
                        name: raw.name,
                        version: raw.version,
                        file_url: raw.file_url,
                        md5: raw.md5,
                    },
                    reason: raw.reason,
                    upgrade_block_height: raw.upgrade_block_height,
                }
            }
            VOTE => {
                let raw: RawVote = payload(data)?;
                GovTx::Vote {
                    proposal_id: raw.proposal_id,
                    answer: answer(&raw.answer)?,
                }
            }
            other => return Err(GovernanceError::UnknownTxType(format!("governance/{other}"))),
        };
        Ok(tx)
    }

    pub fn op(&self) -> &'static str {
        match self {
            GovTx::TransferFund { .. } => PROPOSE_TRANSFER_FUND,
            GovTx::ChangeParam { .. } => PROPOSE_CHANGE_PARAM,
            GovTx::DeployLibEni { .. } => PROPOSE_DEPLOY_LIBENI,
            GovTx::RetireProgram { .. } => PROPOSE_RETIRE_PROGRAM,
            GovTx::UpgradeProgram { .. } => PROPOSE_UPGRADE_PROGRAM,
            GovTx::Vote { .. } => VOTE,
        }
    }
}
