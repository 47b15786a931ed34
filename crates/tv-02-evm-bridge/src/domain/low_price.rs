//! # Low-Price Admission Policy
//!
//! A tx priced below the `gas_price` floor is admitted only if its gas stays
//! under `low_price_tx_gas_limit`, the block still has low-price slots, and no
//! other low-price tx with the same (from, to) pair was admitted in the block.
//! Check and deliver keep separate trackers since mempool and block ordering
//! differ.

use num_bigint::BigInt;
use shared_types::{Address, Amount};
use std::collections::HashSet;
use tv_01_params::Params;

use crate::errors::{EvmError, EvmResult};

/// Per-block record of admitted low-price txs.
#[derive(Debug, Clone, Default)]
pub struct LowPriceTracker {
    pairs: HashSet<(Address, Address)>,
}

impl LowPriceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_low_price(gas_price: &Amount, params: &Params) -> bool {
        gas_price < &BigInt::from(params.gas_price)
    }

    /// Admits or rejects a tx. Contract creations use the zero address as
    /// the recipient.
    pub fn admit(
        &mut self,
        from: Address,
        to: Option<Address>,
        gas_price: &Amount,
        gas_limit: u64,
        params: &Params,
    ) -> EvmResult<()> {
        if !Self::is_low_price(gas_price, params) {
            return Ok(());
        }
        if gas_limit > params.low_price_tx_gas_limit {
            return Err(EvmError::LowPriceGasLimit {
                gas: gas_limit,
                limit: params.low_price_tx_gas_limit,
            });
        }
        let pair = (from, to.unwrap_or(Address::ZERO));
        if self.pairs.contains(&pair) {
            return Err(EvmError::LowGasPrice);
        }
        if self.pairs.len() as i64 >= params.low_price_tx_slots_cap {
            return Err(EvmError::LowPriceCapReached {
                cap: params.low_price_tx_slots_cap,
            });
        }
        self.pairs.insert(pair);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn reset(&mut self) {
        self.pairs.clear();
    }
}
