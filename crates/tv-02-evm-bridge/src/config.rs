//! Bridge configuration

use serde::Deserialize;

use crate::domain::transaction::MAX_TX_SIZE;

pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvmBridgeConfig {
    /// EIP-155 chain id. Must be non-zero.
    pub chain_id: u64,
    /// Maximum encoded transaction size in bytes.
    pub max_tx_size: usize,
    /// Gas limit of a single block.
    pub block_gas_limit: u64,
    /// Accept nonces ahead of the account nonce by the number of txs from
    /// the same sender previously rejected for a bad nonce.
    pub nonce_tolerance: bool,
}

impl Default for EvmBridgeConfig {
    fn default() -> Self {
        Self {
            chain_id: 15,
            max_tx_size: MAX_TX_SIZE,
            block_gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            nonce_tolerance: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvmBridgeConfig::default();
        assert_eq!(config.max_tx_size, 32 * 1024);
        assert!(config.chain_id > 0);
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: EvmBridgeConfig = serde_json::from_str(r#"{"chain_id": 18}"#).unwrap();
        assert_eq!(config.chain_id, 18);
        assert_eq!(config.block_gas_limit, DEFAULT_BLOCK_GAS_LIMIT);
    }
}
