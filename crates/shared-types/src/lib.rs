//! # Shared Types Crate
//!
//! Primitive types used by every crate of the application state machine.
//!
//! ## Design Principles
//!
//! - **Exact arithmetic**: amounts are `BigInt`, ratios are `BigRational`. No
//!   floating point ever reaches a consensus path.
//! - **Canonical encoding**: anything that feeds a root hash is encoded by an
//!   explicit, field-ordered [`CanonicalEncoder`], never by reflection.
//! - **Stable codes**: every user-visible failure maps to an [`ErrorCode`]
//!   whose numeric value never changes.

pub mod canonical;
pub mod entities;
pub mod errors;
pub mod ledger;
pub mod numeric;

pub use canonical::{ripemd160, sha256, CanonicalEncoder};
pub use entities::*;
pub use errors::*;
pub use ledger::*;
pub use numeric::*;
