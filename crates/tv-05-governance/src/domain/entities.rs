//! # Governance Rows
//!
//! Proposals and votes. A proposal's id is the lowercase hex hash of the tx
//! that created it; votes reference it by that id.

use serde::{Deserialize, Serialize};
use shared_types::{amount_serde, Address, Amount, BlockHeight, CanonicalEncoder};
use tv_03_native_store::Record;

/// Final outcome of a proposal. `None` on the row means still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalResult {
    Approved,
    Rejected,
    Expired,
}

impl ProposalResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalResult::Approved => "Approved",
            ProposalResult::Rejected => "Rejected",
            ProposalResult::Expired => "Expired",
        }
    }
}

/// Deployment progress of an ENI library proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibStatus {
    /// Waiting for votes.
    Pending,
    /// Approved, waiting for its deploy height.
    Ready,
    Deployed,
    /// Rejected or expired before deployment.
    Cancelled,
}

impl LibStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibStatus::Pending => "pending",
            LibStatus::Ready => "ready",
            LibStatus::Deployed => "deployed",
            LibStatus::Cancelled => "cancelled",
        }
    }
}

/// Type-specific content of a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProposalDetail {
    TransferFund {
        from: Address,
        to: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    ChangeParam {
        name: String,
        value: String,
    },
    DeployLibEni {
        name: String,
        version: String,
        file_url: String,
        md5: String,
        status: LibStatus,
    },
    RetireProgram {
        /// Comma-separated consensus keys kept after retirement.
        preserved_validators: String,
    },
    UpgradeProgram {
        name: String,
        version: String,
        file_url: String,
        md5: String,
    },
}

impl ProposalDetail {
    pub fn kind(&self) -> &'static str {
        match self {
            ProposalDetail::TransferFund { .. } => "transfer_fund",
            ProposalDetail::ChangeParam { .. } => "change_param",
            ProposalDetail::DeployLibEni { .. } => "deploy_libeni",
            ProposalDetail::RetireProgram { .. } => "retire_program",
            ProposalDetail::UpgradeProgram { .. } => "upgrade_program",
        }
    }

    fn encode(&self, enc: CanonicalEncoder) -> CanonicalEncoder {
        let enc = enc.str(self.kind());
        match self {
            ProposalDetail::TransferFund { from, to, amount } => {
                enc.address(from).address(to).amount(amount)
            }
            ProposalDetail::ChangeParam { name, value } => enc.str(name).str(value),
            ProposalDetail::DeployLibEni {
                name,
                version,
                file_url,
                md5,
                status,
            } => enc
                .str(name)
                .str(version)
                .str(file_url)
                .str(md5)
                .str(status.as_str()),
            ProposalDetail::RetireProgram {
                preserved_validators,
            } => enc.str(preserved_validators),
            ProposalDetail::UpgradeProgram {
                name,
                version,
                file_url,
                md5,
            } => enc.str(name).str(version).str(file_url).str(md5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub proposer: Address,
    pub block_height: BlockHeight,
    pub detail: ProposalDetail,
    pub reason: String,
    pub expire_timestamp: Option<i64>,
    pub expire_block_height: Option<BlockHeight>,
    pub created_at: i64,
    pub result: Option<ProposalResult>,
    pub result_msg: String,
    pub result_block_height: Option<BlockHeight>,
    pub result_at: Option<i64>,
}

impl Proposal {
    pub fn is_open(&self) -> bool {
        self.result.is_none()
    }

    /// True once either expiry bound has been reached.
    pub fn is_expired_at(&self, height: BlockHeight, block_time: i64) -> bool {
        self.expire_block_height.map_or(false, |h| height >= h)
            || self.expire_timestamp.map_or(false, |t| block_time >= t)
    }

    fn status_index(&self) -> &'static str {
        if self.is_open() {
            "open"
        } else {
            "closed"
        }
    }
}

fn opt_i64(enc: CanonicalEncoder, value: Option<i64>) -> CanonicalEncoder {
    match value {
        Some(v) => enc.bool(true).i64(v),
        None => enc.bool(false),
    }
}

impl Record for Proposal {
    const TABLE: &'static str = "governance_proposals";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("status", self.status_index().to_string()),
            ("kind", self.detail.kind().to_string()),
        ]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let enc = CanonicalEncoder::new()
            .str(&self.id)
            .address(&self.proposer)
            .i64(self.block_height);
        let enc = self.detail.encode(enc).str(&self.reason);
        let enc = opt_i64(enc, self.expire_timestamp);
        let enc = opt_i64(enc, self.expire_block_height).i64(self.created_at);
        let enc = enc.str(self.result.map_or("", |r| r.as_str())).str(&self.result_msg);
        let enc = opt_i64(enc, self.result_block_height);
        opt_i64(enc, self.result_at).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteAnswer {
    #[serde(rename = "Y")]
    Yes,
    #[serde(rename = "N")]
    No,
}

impl VoteAnswer {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteAnswer::Yes => "Y",
            VoteAnswer::No => "N",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: u64,
    pub proposal_id: String,
    pub voter: Address,
    pub answer: VoteAnswer,
    pub block_height: BlockHeight,
    pub created_at: i64,
}

impl Vote {
    pub fn pair_key(proposal_id: &str, voter: &Address) -> String {
        format!("{proposal_id}/{voter}")
    }
}

impl Record for Vote {
    const TABLE: &'static str = "governance_votes";
    const UNIQUE_INDEXES: &'static [&'static str] = &["pair"];
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn index_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("pair", Vote::pair_key(&self.proposal_id, &self.voter)),
            ("proposal", self.proposal_id.clone()),
        ]
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new()
            .u64(self.id)
            .str(&self.proposal_id)
            .address(&self.voter)
            .str(self.answer.as_str())
            .i64(self.block_height)
            .i64(self.created_at)
            .finish()
    }
}
