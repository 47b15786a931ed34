//! In-process adapters for the bridge ports.

pub mod memory_state;
pub mod transfer_executor;

pub use memory_state::InMemoryWorldState;
pub use transfer_executor::{contract_address, TransferExecutor};
