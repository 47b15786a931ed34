//! # Travis App
//!
//! The application state machine behind the consensus engine.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`abci`] | request and response messages |
//! | [`ports`] | the [`Application`] contract and a shared handle |
//! | [`domain`] | native envelope, scheduled transactions, app root |
//! | [`store`] | the scheduled-transaction table |
//! | [`service`] | [`TravisApp`]: lifecycle, tx routing, queries |
//!
//! ## Block flow
//!
//! ```text
//! BeginBlock ─► absences, due scheduled calls
//! DeliverTx  ─► EVM bridge  | native router (stake/*, governance/*)
//! EndBlock   ─► fees + subsidy, slashing, rewards, validator set, unstakes
//! Commit     ─► RIPEMD-160(eth_root ‖ native_root ‖ aux_db_root)
//! ```

pub mod abci;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;
pub mod store;

pub use config::AppConfig;
pub use domain::{app_root, aux_db_root, Envelope, NativeTx, ScheduleStatus, ScheduledTx};
pub use errors::{AppError, AppResult};
pub use ports::{Application, SharedApp};
pub use service::{TravisApp, APP_HASH_META};
pub use store::ScheduledStore;
