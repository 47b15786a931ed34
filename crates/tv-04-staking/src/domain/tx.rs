//! Staking transaction payloads.
//!
//! Each payload is the `data` object of a `stake/<op>` envelope. Amounts and
//! rates travel as strings and are parsed by [`StakeTx::decode`], so a
//! malformed number is an encoding error rather than a silent zero.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{parse_amount, parse_ratio, Address, Amount, PubKey, Ratio};

use crate::domain::entities::Description;
use crate::errors::{StakeError, StakeResult};

pub const DECLARE_CANDIDACY: &str = "declareCandidacy";
pub const UPDATE_CANDIDACY: &str = "updateCandidacy";
pub const WITHDRAW_CANDIDACY: &str = "withdrawCandidacy";
pub const VERIFY_CANDIDACY: &str = "verifyCandidacy";
pub const ACTIVATE_CANDIDACY: &str = "activateCandidacy";
pub const DEACTIVATE_CANDIDACY: &str = "deactivateCandidacy";
pub const DELEGATE: &str = "delegate";
pub const WITHDRAW: &str = "withdraw";
pub const SET_COMP_RATE: &str = "setCompRate";
pub const UPDATE_CANDIDACY_ACCOUNT: &str = "updateCandidacyAccount";
pub const ACCEPT_CANDIDACY_ACCOUNT_UPDATE: &str = "acceptCandidacyAccountUpdate";

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawDeclare {
    pub_key: String,
    max_amount: String,
    comp_rate: String,
    #[serde(default)]
    description: Description,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawUpdate {
    #[serde(default)]
    pub_key: Option<String>,
    #[serde(default)]
    max_amount: Option<String>,
    #[serde(default)]
    comp_rate: Option<String>,
    #[serde(default)]
    description: Description,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawVerify {
    candidate_address: Address,
    verified: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawDelegate {
    validator_address: Address,
    amount: String,
    #[serde(default)]
    cube_batch: String,
    #[serde(default)]
    sig: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawWithdraw {
    validator_address: Address,
    amount: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawSetCompRate {
    delegator_address: Address,
    comp_rate: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawUpdateAccount {
    new_candidate_account: Address,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawAcceptAccount {
    account_update_request_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclareCandidacy {
    pub pub_key: PubKey,
    pub max_amount: Amount,
    pub comp_rate: Ratio,
    pub description: Description,
}

/// Fields left `None` (or empty, for description fields) are unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCandidacy {
    pub pub_key: Option<PubKey>,
    pub max_amount: Option<Amount>,
    pub comp_rate: Option<Ratio>,
    pub description: Description,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delegate {
    pub validator_address: Address,
    pub amount: Amount,
    pub cube_batch: String,
    pub sig: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StakeTx {
    DeclareCandidacy(DeclareCandidacy),
    UpdateCandidacy(UpdateCandidacy),
    WithdrawCandidacy,
    VerifyCandidacy {
        candidate_address: Address,
        verified: bool,
    },
    ActivateCandidacy,
    DeactivateCandidacy,
    Delegate(Delegate),
    Withdraw {
        validator_address: Address,
        amount: Amount,
    },
    SetCompRate {
        delegator_address: Address,
        comp_rate: Ratio,
    },
    UpdateCandidacyAccount {
        new_candidate_account: Address,
    },
    AcceptCandidacyAccountUpdate {
        request_id: u64,
    },
}

fn payload<T: DeserializeOwned>(data: &Value) -> StakeResult<T> {
    serde_json::from_value(data.clone()).map_err(|e| StakeError::InvalidPayload(e.to_string()))
}

fn amount(s: &str) -> StakeResult<Amount> {
    parse_amount(s).map_err(|e| StakeError::InvalidPayload(e.to_string()))
}

fn ratio(s: &str) -> StakeResult<Ratio> {
    parse_ratio(s).map_err(|_| StakeError::InvalidCompRate)
}

fn pub_key(s: &str) -> StakeResult<PubKey> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(StakeError::InvalidPubKey(s.to_string()));
    }
    Ok(PubKey::new(trimmed))
}

impl StakeTx {
    /// Decodes the payload of `stake/<op>`.
    pub fn decode(op: &str, data: &Value) -> StakeResult<Self> {
        let tx = match op {
            DECLARE_CANDIDACY => {
                let raw: RawDeclare = payload(data)?;
                StakeTx::DeclareCandidacy(DeclareCandidacy {
                    pub_key: pub_key(&raw.pub_key)?,
                    max_amount: amount(&raw.max_amount)?,
                    comp_rate: ratio(&raw.comp_rate)?,
                    description: raw.description,
                })
            }
            UPDATE_CANDIDACY => {
                let raw: RawUpdate = payload(data)?;
                StakeTx::UpdateCandidacy(UpdateCandidacy {
                    pub_key: raw.pub_key.as_deref().map(pub_key).transpose()?,
                    max_amount: raw.max_amount.as_deref().map(amount).transpose()?,
                    comp_rate: raw.comp_rate.as_deref().map(ratio).transpose()?,
                    description: raw.description,
                })
            }
            WITHDRAW_CANDIDACY => StakeTx::WithdrawCandidacy,
            VERIFY_CANDIDACY => {
                let raw: RawVerify = payload(data)?;
                StakeTx::VerifyCandidacy {
                    candidate_address: raw.candidate_address,
                    verified: raw.verified,
                }
            }
            ACTIVATE_CANDIDACY => StakeTx::ActivateCandidacy,
            DEACTIVATE_CANDIDACY => StakeTx::DeactivateCandidacy,
            DELEGATE => {
                let raw: RawDelegate = payload(data)?;
                StakeTx::Delegate(Delegate {
                    validator_address: raw.validator_address,
                    amount: amount(&raw.amount)?,
                    cube_batch: raw.cube_batch,
                    sig: raw.sig,
                })
            }
            WITHDRAW => {
                let raw: RawWithdraw = payload(data)?;
                StakeTx::Withdraw {
                    validator_address: raw.validator_address,
                    amount: amount(&raw.amount)?,
                }
            }
            SET_COMP_RATE => {
                let raw: RawSetCompRate = payload(data)?;
                StakeTx::SetCompRate {
                    delegator_address: raw.delegator_address,
                    comp_rate: ratio(&raw.comp_rate)?,
                }
            }
            UPDATE_CANDIDACY_ACCOUNT => {
                let raw: RawUpdateAccount = payload(data)?;
                StakeTx::UpdateCandidacyAccount {
                    new_candidate_account: raw.new_candidate_account,
                }
            }
            ACCEPT_CANDIDACY_ACCOUNT_UPDATE => {
                let raw: RawAcceptAccount = payload(data)?;
                StakeTx::AcceptCandidacyAccountUpdate {
                    request_id: raw.account_update_request_id,
                }
            }
            other => return Err(StakeError::UnknownTxType(format!("stake/{other}"))),
        };
        Ok(tx)
    }

    pub fn op(&self) -> &'static str {
        match self {
            StakeTx::DeclareCandidacy(_) => DECLARE_CANDIDACY,
            StakeTx::UpdateCandidacy(_) => UPDATE_CANDIDACY,
            StakeTx::WithdrawCandidacy => WITHDRAW_CANDIDACY,
            StakeTx::VerifyCandidacy { .. } => VERIFY_CANDIDACY,
            StakeTx::ActivateCandidacy => ACTIVATE_CANDIDACY,
            StakeTx::DeactivateCandidacy => DEACTIVATE_CANDIDACY,
            StakeTx::Delegate(_) => DELEGATE,
            StakeTx::Withdraw { .. } => WITHDRAW,
            StakeTx::SetCompRate { .. } => SET_COMP_RATE,
            StakeTx::UpdateCandidacyAccount { .. } => UPDATE_CANDIDACY_ACCOUNT,
            StakeTx::AcceptCandidacyAccountUpdate { .. } => ACCEPT_CANDIDACY_ACCOUNT_UPDATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use serde_json::json;
    use shared_types::ratio_from_ints;

    #[test]
    fn test_decode_declare() {
        let tx = StakeTx::decode(
            DECLARE_CANDIDACY,
            &json!({
                "pub_key": "0xabc",
                "max_amount": "1000000000000000000000",
                "comp_rate": "1/5",
                "description": {"name": "node-1"}
            }),
        )
        .unwrap();
        let StakeTx::DeclareCandidacy(d) = tx else {
            panic!("wrong variant");
        };
        assert_eq!(d.pub_key, PubKey::from("0xabc"));
        assert_eq!(d.max_amount, BigInt::from(10u8).pow(21));
        assert_eq!(d.comp_rate, ratio_from_ints(1, 5));
        assert_eq!(d.description.name, "node-1");
    }

    #[test]
    fn test_decode_update_keeps_absent_fields() {
        let tx = StakeTx::decode(UPDATE_CANDIDACY, &json!({"comp_rate": "0.3"})).unwrap();
        let StakeTx::UpdateCandidacy(u) = tx else {
            panic!("wrong variant");
        };
        assert!(u.pub_key.is_none());
        assert!(u.max_amount.is_none());
        assert_eq!(u.comp_rate, Some(ratio_from_ints(3, 10)));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            StakeTx::decode("bond", &json!({})),
            Err(StakeError::UnknownTxType(_))
        ));
        assert!(matches!(
            StakeTx::decode(WITHDRAW, &json!({"validator_address": "0x01"})),
            Err(StakeError::InvalidPayload(_))
        ));
        assert!(matches!(
            StakeTx::decode(
                DECLARE_CANDIDACY,
                &json!({"pub_key": "", "max_amount": "1", "comp_rate": "0.1"})
            ),
            Err(StakeError::InvalidPubKey(_))
        ));
    }

    #[test]
    fn test_empty_payload_ops() {
        assert_eq!(
            StakeTx::decode(WITHDRAW_CANDIDACY, &Value::Null).unwrap(),
            StakeTx::WithdrawCandidacy
        );
        assert_eq!(StakeTx::ActivateCandidacy.op(), ACTIVATE_CANDIDACY);
    }
}
