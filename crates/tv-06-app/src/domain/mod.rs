//! App domain: the native envelope, scheduled transactions and the root
//! combiner.

pub mod envelope;
pub mod root;
pub mod scheduled;

pub use envelope::{Envelope, NativeTx, GOVERNANCE_MODULE, STAKE_MODULE};
pub use root::{app_root, aux_db_root};
pub use scheduled::{ScheduleStatus, ScheduledTx};
