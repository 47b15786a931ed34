//! # Governance
//!
//! Validator-voted proposals for the native transaction path.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`domain`] | proposal and vote rows, `governance/<op>` payloads |
//! | [`store`] | the two governance tables as one journaled unit |
//! | [`service`] | propose/vote validation, tallying, expiry, effects |
//! | [`ports`] | node-level program actions |
//!
//! Funds of a TransferFund proposal are parked in
//! [`shared_types::GOV_HOLD_ACCOUNT`] from proposal until the outcome is
//! known.

pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;
pub mod store;

pub use domain::{
    Expiry, GovTx, LibSpec, LibStatus, Proposal, ProposalDetail, ProposalResult, Vote, VoteAnswer,
};
pub use errors::{GovResult, GovernanceError};
pub use ports::{ProgramControl, ProgramEvent, RecordingProgramControl};
pub use service::{Effects, GovernanceService, ProposalView, Tally};
pub use store::{GovernanceSavepoint, GovernanceStore};
