//! Governance domain: rows and tx payloads.

pub mod entities;
pub mod tx;

pub use entities::{LibStatus, Proposal, ProposalDetail, ProposalResult, Vote, VoteAnswer};
pub use tx::{Expiry, GovTx, LibSpec};
