//! # Genesis Document
//!
//! The `app_state` bytes handed to InitChain: initial parameters (including
//! the trusted cube keys), initial validators and pre-funded accounts.

use num_bigint::BigInt;
use num_traits::Signed;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use shared_types::{is_open_unit_interval, ratio_serde, Address, PubKey, Ratio};
use std::collections::HashSet;

use crate::errors::{ParamError, ParamResult};
use crate::params::Params;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub pub_key: PubKey,
    pub address: Address,
    /// Initial self-delegation in wei.
    #[serde_as(as = "DisplayFromStr")]
    pub shares: BigInt,
    #[serde_as(as = "DisplayFromStr")]
    pub max_amount: BigInt,
    #[serde(with = "ratio_serde")]
    pub comp_rate: Ratio,
    #[serde(default)]
    pub name: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub balance: BigInt,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

impl Genesis {
    /// Parses and validates genesis `app_state` bytes. Empty input yields the
    /// default genesis.
    pub fn from_json(bytes: &[u8]) -> ParamResult<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let genesis: Genesis = serde_json::from_slice(bytes)?;
        genesis.validate()?;
        Ok(genesis)
    }

    pub fn to_json(&self) -> ParamResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn validate(&self) -> ParamResult<()> {
        let mut pub_keys = HashSet::new();
        let mut owners = HashSet::new();

        for v in &self.validators {
            if !pub_keys.insert(v.pub_key.clone()) {
                return Err(ParamError::Genesis(format!("duplicate pub_key {}", v.pub_key)));
            }
            if !owners.insert(v.address) {
                return Err(ParamError::Genesis(format!("duplicate address {}", v.address)));
            }
            if v.shares.is_negative() || v.shares > v.max_amount {
                return Err(ParamError::Genesis(format!(
                    "validator {} shares must be within [0, max_amount]",
                    v.pub_key
                )));
            }
            if !is_open_unit_interval(&v.comp_rate) {
                return Err(ParamError::Genesis(format!(
                    "validator {} comp_rate must be in (0, 1)",
                    v.pub_key
                )));
            }
        }

        for account in &self.accounts {
            if account.balance.is_negative() {
                return Err(ParamError::Genesis(format!(
                    "account {} has a negative balance",
                    account.address
                )));
            }
        }

        self.params.cube_pub_keys()?;
        Ok(())
    }
}
