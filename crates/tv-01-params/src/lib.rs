//! # Parameter Registry
//!
//! Tunable protocol parameters for the staking, governance and EVM-admission
//! rules.
//!
//! ## Lifecycle
//!
//! ```text
//! genesis app_state ──► ParamRegistry::replace ──► dirty
//!                                                   │
//! ChangeParam accepted ──► set_param ──► dirty ─────┤
//!                                                   ▼
//!                         Commit: to_blob() ──► native kv "params"
//! ```
//!
//! Parameters are never read from configuration files: the registry is the
//! only source, and it changes only through genesis and accepted ChangeParam
//! proposals.

pub mod errors;
pub mod genesis;
pub mod params;
pub mod registry;

pub use errors::{ParamError, ParamResult};
pub use genesis::{Genesis, GenesisAccount, GenesisValidator};
pub use params::{
    param_kind, CubePubKey, ParamKind, Params, BLOCKS_PER_DAY, BLOCKS_PER_YEAR, SECONDS_PER_BLOCK,
};
pub use registry::{check_param_type, ParamRegistry, PARAMS_KEY};
