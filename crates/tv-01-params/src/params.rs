//! # Protocol Parameters
//!
//! The full set of tunable protocol parameters, their declared types and
//! defaults. Field names are the external parameter keys used by genesis,
//! ChangeParam proposals and the serialized blob.

use serde::{Deserialize, Serialize};
use shared_types::{ratio_from_ints, ratio_serde, Address, Ratio};

use crate::errors::{ParamError, ParamResult};

/// Seconds per block assumed by every block-denominated default.
pub const SECONDS_PER_BLOCK: u64 = 10;

/// Blocks per day at [`SECONDS_PER_BLOCK`].
pub const BLOCKS_PER_DAY: u64 = 24 * 3600 / SECONDS_PER_BLOCK;

/// Blocks per year, the period of the inflation schedule.
pub const BLOCKS_PER_YEAR: u64 = 365 * BLOCKS_PER_DAY;

/// Declared value type of a parameter, used to validate ChangeParam values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    U16,
    I16,
    Uint,
    Int,
    Rat,
    Bool,
    Json,
    Address,
}

/// Live protocol configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Number of active validators.
    pub max_vals: u16,
    /// Number of backup validators.
    pub backup_vals: u16,
    #[serde(with = "ratio_serde")]
    pub self_staking_ratio: Ratio,
    /// Annual inflation, in percent.
    pub inflation_rate: i64,
    /// Per-validator cap on the share of total stake.
    #[serde(with = "ratio_serde")]
    pub validator_size_threshold: Ratio,
    /// Blocks between a withdraw request and the funds returning.
    pub unstake_waiting_period: u64,
    /// Default proposal lifetime in blocks.
    pub proposal_expire_period: u64,
    /// Base gas price in wei; the floor of the low-price policy.
    pub gas_price: u64,
    pub low_price_tx_gas_limit: u64,
    pub low_price_tx_slots_cap: i64,
    #[serde(with = "ratio_serde")]
    pub slash_ratio: Ratio,
    pub max_slash_blocks: i16,
    /// Voting-power floor, in whole tokens.
    pub min_staking_amount: i64,
    pub declare_candidacy_gas: u64,
    pub update_candidacy_gas: u64,
    pub set_comp_rate_gas: u64,
    pub update_candidacy_account_gas: u64,
    pub accept_candidacy_account_update_gas: u64,
    pub transfer_fund_proposal_gas: u64,
    pub change_param_proposal_gas: u64,
    pub deploy_libeni_proposal_gas: u64,
    pub retire_program_proposal_gas: u64,
    pub upgrade_program_proposal_gas: u64,
    /// JSON list of `{cube_batch, pub_key}` trusted for delegation pre-auth.
    pub cube_pub_keys: String,
    /// When false, slashing records zero-amount rows only.
    pub slash_enabled: bool,
    /// Share of each award that goes to validators; the rest to backups.
    #[serde(with = "ratio_serde")]
    pub validators_block_award_ratio: Ratio,
    /// Only this account may verify candidates.
    pub foundation_address: Address,
    /// Blocks between candidate daily-stake snapshots.
    pub cal_stake_interval: u64,
    /// Blocks between validator-set recomputations (and reward payouts).
    pub cal_vp_interval: u64,
    /// Blocks between average-staking-date accumulations.
    pub cal_avg_staking_date_interval: u64,
    /// Minimum distance, in blocks, between a program proposal and its height.
    pub min_program_notice_blocks: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            max_vals: 100,
            backup_vals: 1,
            self_staking_ratio: ratio_from_ints(10, 100),
            inflation_rate: 8,
            validator_size_threshold: ratio_from_ints(12, 100),
            unstake_waiting_period: 7 * BLOCKS_PER_DAY,
            proposal_expire_period: 7 * BLOCKS_PER_DAY,
            gas_price: 2_000_000_000,
            low_price_tx_gas_limit: 500_000,
            low_price_tx_slots_cap: 100,
            slash_ratio: ratio_from_ints(1, 1000),
            max_slash_blocks: 12,
            min_staking_amount: 1000,
            declare_candidacy_gas: 1_000_000,
            update_candidacy_gas: 1_000_000,
            set_comp_rate_gas: 21_000,
            update_candidacy_account_gas: 1_000_000,
            accept_candidacy_account_update_gas: 1_000_000,
            transfer_fund_proposal_gas: 2_000_000,
            change_param_proposal_gas: 2_000_000,
            deploy_libeni_proposal_gas: 2_000_000,
            retire_program_proposal_gas: 2_000_000,
            upgrade_program_proposal_gas: 2_000_000,
            cube_pub_keys: "[]".to_string(),
            slash_enabled: true,
            validators_block_award_ratio: ratio_from_ints(90, 100),
            foundation_address: Address([
                0x7e, 0xff, 0x12, 0x2b, 0x94, 0x89, 0x7e, 0xa5, 0xb0, 0xe2, 0xa9, 0xab, 0xf4,
                0x7b, 0x86, 0x33, 0x7f, 0xaf, 0xeb, 0xdc,
            ]),
            cal_stake_interval: BLOCKS_PER_DAY,
            cal_vp_interval: 3600 / SECONDS_PER_BLOCK,
            cal_avg_staking_date_interval: BLOCKS_PER_DAY,
            min_program_notice_blocks: 10,
        }
    }
}

/// Declared type of every recognized key.
pub const PARAM_KINDS: &[(&str, ParamKind)] = &[
    ("max_vals", ParamKind::U16),
    ("backup_vals", ParamKind::U16),
    ("self_staking_ratio", ParamKind::Rat),
    ("inflation_rate", ParamKind::Int),
    ("validator_size_threshold", ParamKind::Rat),
    ("unstake_waiting_period", ParamKind::Uint),
    ("proposal_expire_period", ParamKind::Uint),
    ("gas_price", ParamKind::Uint),
    ("low_price_tx_gas_limit", ParamKind::Uint),
    ("low_price_tx_slots_cap", ParamKind::Int),
    ("slash_ratio", ParamKind::Rat),
    ("max_slash_blocks", ParamKind::I16),
    ("min_staking_amount", ParamKind::Int),
    ("declare_candidacy_gas", ParamKind::Uint),
    ("update_candidacy_gas", ParamKind::Uint),
    ("set_comp_rate_gas", ParamKind::Uint),
    ("update_candidacy_account_gas", ParamKind::Uint),
    ("accept_candidacy_account_update_gas", ParamKind::Uint),
    ("transfer_fund_proposal_gas", ParamKind::Uint),
    ("change_param_proposal_gas", ParamKind::Uint),
    ("deploy_libeni_proposal_gas", ParamKind::Uint),
    ("retire_program_proposal_gas", ParamKind::Uint),
    ("upgrade_program_proposal_gas", ParamKind::Uint),
    ("cube_pub_keys", ParamKind::Json),
    ("slash_enabled", ParamKind::Bool),
    ("validators_block_award_ratio", ParamKind::Rat),
    ("foundation_address", ParamKind::Address),
    ("cal_stake_interval", ParamKind::Uint),
    ("cal_vp_interval", ParamKind::Uint),
    ("cal_avg_staking_date_interval", ParamKind::Uint),
    ("min_program_notice_blocks", ParamKind::Uint),
];

/// Looks up the declared kind of a parameter key.
pub fn param_kind(name: &str) -> Option<ParamKind> {
    PARAM_KINDS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, kind)| *kind)
}

/// One trusted cube RSA key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubePubKey {
    pub cube_batch: String,
    /// PEM-encoded SubjectPublicKeyInfo.
    pub pub_key: String,
}

impl Params {
    /// Parses the `cube_pub_keys` JSON list.
    pub fn cube_pub_keys(&self) -> ParamResult<Vec<CubePubKey>> {
        serde_json::from_str(&self.cube_pub_keys).map_err(|e| ParamError::InvalidValue {
            name: "cube_pub_keys".to_string(),
            value: self.cube_pub_keys.clone(),
            reason: e.to_string(),
        })
    }

    /// True when `height` is a validator-set / reward epoch boundary.
    pub fn is_vp_epoch(&self, height: i64) -> bool {
        height == 1 || is_multiple(height, self.cal_vp_interval)
    }

    /// True when `height` is a daily-stake snapshot boundary.
    pub fn is_stake_snapshot_height(&self, height: i64) -> bool {
        is_multiple(height, self.cal_stake_interval)
    }

    /// True when `height` is an average-staking-date accumulation boundary.
    pub fn is_avg_staking_date_height(&self, height: i64) -> bool {
        is_multiple(height, self.cal_avg_staking_date_interval)
    }
}

fn is_multiple(height: i64, interval: u64) -> bool {
    match i64::try_from(interval) {
        Ok(interval) if interval > 0 => height > 0 && height % interval == 0,
        _ => false,
    }
}
