//! # EVM Bridge
//!
//! The boundary between the application state machine and the EVM: decodes
//! signed transactions, admits them into the mempool, executes them in the
//! block under construction, and applies the balance transfers queued by
//! native handlers.
//!
//! ## Transaction flow
//!
//! ```text
//! raw bytes ──► decode (size, RLP, chain id, sender recovery)
//!                  │
//!                  ├── EVM shape ──► check_tx / deliver_tx ──► Executor
//!                  │
//!                  └── native shape ──► check_native / check_native_deliver
//!                                         (router runs the handler)
//!                                       ──► accept_native_check / finish_native_deliver
//! ```
//!
//! ## EndBlock and Commit
//!
//! 1. `apply_deferred` drains the deferred queue into the working copy.
//! 2. `commit` folds the working copy into the committed head and returns the
//!    world-state root. The mempool overlay and per-block trackers reset.
//!
//! Gas paid by EVM transactions is burned and accumulated into the block fee
//! total, which the reward distributor later re-mints.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;

pub use adapters::{contract_address, InMemoryWorldState, TransferExecutor};
pub use config::EvmBridgeConfig;
pub use domain::{
    address_of, Account, BlockContext, DeferredTransfers, EthTransaction, Log, LowPriceTracker,
    Receipt, ScheduledCall, UnsignedTransaction,
};
pub use errors::{EvmError, EvmResult};
pub use ports::{Executor, WorldState};
pub use service::{BridgeStats, CheckView, DeliverLedger, EvmBridge};

// Re-exported for callers building transactions.
pub use primitive_types::U256;
pub use secp256k1::SecretKey;
