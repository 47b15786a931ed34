//! Application configuration
//!
//! Node-local settings only. Protocol parameters come from genesis and
//! governance through the parameter registry.

use serde::Deserialize;
use tv_02_evm_bridge::EvmBridgeConfig;
use tv_03_native_store::NativeStoreConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Consensus chain id reported to and checked against InitChain.
    pub chain_id: String,
    pub storage: NativeStoreConfig,
    pub bridge: EvmBridgeConfig,
    /// Target block interval in seconds.
    pub block_time_secs: u64,
    /// Version string reported by Info.
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain_id: "travis-local".to_string(),
            storage: NativeStoreConfig::default(),
            bridge: EvmBridgeConfig::default(),
            block_time_secs: tv_01_params::SECONDS_PER_BLOCK,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
