//! Domain layer of the EVM bridge.

pub mod deferred;
pub mod entities;
pub mod low_price;
pub mod transaction;

pub use deferred::DeferredTransfers;
pub use entities::{Account, BlockContext, Log, Receipt, ScheduledCall};
pub use low_price::LowPriceTracker;
pub use transaction::{
    address_of, intrinsic_gas, u256_to_amount, EthTransaction, UnsignedTransaction, MAX_TX_SIZE,
};
