//! # Ethereum Transactions
//!
//! RLP decoding of signed legacy (EIP-155) transactions, sender recovery and
//! signing. Every byte string entering the application is decoded here first;
//! the decoded form then decides whether the tx is EVM or native.

use num_bigint::{BigInt, Sign};
use num_traits::Zero;
use primitive_types::U256;
use rlp::{DecoderError, Rlp, RlpStream};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};
use shared_types::{Address, Amount, Hash};
use tracing::debug;

use crate::errors::{EvmError, EvmResult};

/// Maximum encoded transaction size (32 KiB).
pub const MAX_TX_SIZE: usize = 32 * 1024;

/// Base cost of any transaction.
pub const TX_GAS: u64 = 21_000;
/// Base cost of a contract creation.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
pub const TX_DATA_ZERO_GAS: u64 = 4;
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;

/// A decoded, signature-verified transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthTransaction {
    pub hash: Hash,
    pub sender: Address,
    pub nonce: u64,
    pub gas_price: Amount,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: Amount,
    pub data: Vec<u8>,
    /// EIP-155 chain id; `None` for pre-EIP-155 signatures.
    pub chain_id: Option<u64>,
    /// Encoded size in bytes.
    pub size: usize,
}

impl EthTransaction {
    /// Decodes raw bytes and recovers the sender.
    pub fn decode(raw: &[u8]) -> EvmResult<Self> {
        if raw.len() > MAX_TX_SIZE {
            return Err(EvmError::TxTooLarge {
                size: raw.len(),
                max: MAX_TX_SIZE,
            });
        }
        if raw.is_empty() {
            return Err(EvmError::InvalidEncoding("empty transaction".to_string()));
        }
        if raw[0] < 0x7f {
            return Err(EvmError::InvalidEncoding(format!(
                "unsupported typed transaction 0x{:02x}",
                raw[0]
            )));
        }

        let rlp = Rlp::new(raw);
        if !rlp.is_list() {
            return Err(EvmError::InvalidEncoding("transaction must be an RLP list".to_string()));
        }
        let item_count = rlp.item_count().map_err(|e| rlp_error("item count", e))?;
        if item_count != 9 {
            return Err(EvmError::InvalidEncoding(format!(
                "legacy transaction must have 9 fields, got {item_count}"
            )));
        }

        let fields = UnsignedTransaction {
            nonce: decode_u64(&rlp, 0)?,
            gas_price: decode_u256(&rlp, 1)?,
            gas_limit: decode_u64(&rlp, 2)?,
            to: decode_optional_address(&rlp, 3)?,
            value: decode_u256(&rlp, 4)?,
            data: decode_bytes(&rlp, 5)?,
        };
        let v = decode_u64(&rlp, 6)?;
        let r = decode_bytes32(&rlp, 7)?;
        let s = decode_bytes32(&rlp, 8)?;

        let (chain_id, recovery_id) = match v {
            27 | 28 => (None, v - 27),
            v if v >= 35 => (Some((v - 35) / 2), (v - 35) % 2),
            _ => {
                return Err(EvmError::InvalidSignature(format!("invalid v value {v}")));
            }
        };

        let signing_hash = fields.signing_hash(chain_id);
        let sender = recover_sender(&signing_hash, recovery_id, &r, &s)?;
        let hash = Hash(Keccak256::digest(raw).into());

        debug!(
            hash = %hash,
            sender = %sender,
            nonce = fields.nonce,
            "Decoded transaction"
        );

        Ok(Self {
            hash,
            sender,
            nonce: fields.nonce,
            gas_price: u256_to_amount(&fields.gas_price),
            gas_limit: fields.gas_limit,
            to: fields.to,
            value: u256_to_amount(&fields.value),
            data: fields.data,
            chain_id,
            size: raw.len(),
        })
    }

    /// True for the native envelope shape: no recipient, zero value, zero gas,
    /// zero gas price and a non-empty payload.
    pub fn is_native(&self) -> bool {
        self.to.is_none()
            && self.value.is_zero()
            && self.gas_limit == 0
            && self.gas_price.is_zero()
            && !self.data.is_empty()
    }

    /// `value + gas_limit × gas_price`.
    pub fn cost(&self) -> Amount {
        &self.value + BigInt::from(self.gas_limit) * &self.gas_price
    }

    /// Who pays for gas. The sender pays when it can cover `cost()`; otherwise
    /// a contract callee holding enough to prepay the gas pays, provided the
    /// sender can still cover the value. `None` when neither can.
    pub fn gas_payer(
        &self,
        sender_balance: &Amount,
        callee_has_code: bool,
        callee_balance: &Amount,
    ) -> Option<Address> {
        if sender_balance >= &self.cost() {
            return Some(self.sender);
        }
        let gas_cost = BigInt::from(self.gas_limit) * &self.gas_price;
        match self.to {
            Some(to) if callee_has_code && callee_balance >= &gas_cost && sender_balance >= &self.value => {
                Some(to)
            }
            _ => None,
        }
    }

    /// Homestead intrinsic gas.
    pub fn intrinsic_gas(&self) -> u64 {
        intrinsic_gas(&self.data, self.to.is_none())
    }
}

/// Homestead intrinsic gas for a payload.
pub fn intrinsic_gas(data: &[u8], contract_creation: bool) -> u64 {
    let base = if contract_creation {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    let zeros = data.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = data.len() as u64 - zeros;
    base.saturating_add(zeros.saturating_mul(TX_DATA_ZERO_GAS))
        .saturating_add(non_zeros.saturating_mul(TX_DATA_NON_ZERO_GAS))
}

/// The signable fields of a legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
}

impl UnsignedTransaction {
    /// A native envelope carrier: zero value, gas and price, no recipient.
    pub fn native(nonce: u64, payload: Vec<u8>) -> Self {
        Self {
            nonce,
            gas_price: U256::zero(),
            gas_limit: 0,
            to: None,
            value: U256::zero(),
            data: payload,
        }
    }

    /// A plain value transfer.
    pub fn transfer(nonce: u64, to: Address, value: U256, gas_price: U256, gas_limit: u64) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            to: Some(to),
            value,
            data: Vec::new(),
        }
    }

    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        match &self.to {
            Some(to) => stream.append(&to.0.to_vec()),
            None => stream.append(&""),
        };
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// Keccak-256 of the EIP-155 signing payload.
    pub fn signing_hash(&self, chain_id: Option<u64>) -> [u8; 32] {
        let mut stream = RlpStream::new_list(if chain_id.is_some() { 9 } else { 6 });
        self.append_fields(&mut stream);
        if let Some(chain_id) = chain_id {
            stream.append(&chain_id);
            stream.append(&0u8);
            stream.append(&0u8);
        }
        Keccak256::digest(stream.as_raw()).into()
    }

    /// Signs with EIP-155 replay protection and returns the raw encoding.
    pub fn sign(&self, key: &SecretKey, chain_id: u64) -> Vec<u8> {
        let secp = Secp256k1::new();
        let message = Message::from_digest(self.signing_hash(Some(chain_id)));
        let (recovery_id, compact) = secp
            .sign_ecdsa_recoverable(&message, key)
            .serialize_compact();
        let v = chain_id * 2 + 35 + recovery_id.to_i32() as u64;

        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream.append(&v);
        stream.append(&trim_leading_zeros(&compact[..32]));
        stream.append(&trim_leading_zeros(&compact[32..]));
        stream.out().to_vec()
    }
}

/// The account address controlled by a secret key.
pub fn address_of(key: &SecretKey) -> Address {
    let secp = Secp256k1::new();
    pubkey_to_address(&PublicKey::from_secret_key(&secp, key))
}

pub fn u256_to_amount(value: &U256) -> Amount {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    BigInt::from_bytes_be(Sign::Plus, &buf)
}

fn pubkey_to_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address(bytes)
}

fn recover_sender(
    signing_hash: &[u8; 32],
    recovery_id: u64,
    r: &[u8; 32],
    s: &[u8; 32],
) -> EvmResult<Address> {
    if r == &[0u8; 32] || s == &[0u8; 32] {
        return Err(EvmError::InvalidSignature("r or s is zero".to_string()));
    }

    // s must be in the lower half of the curve order (EIP-2).
    let half_n: [u8; 32] = [
        0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
        0xFF, 0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B,
        0x20, 0xA0,
    ];
    if s > &half_n {
        return Err(EvmError::InvalidSignature("s value too high".to_string()));
    }

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(r);
    compact[32..].copy_from_slice(s);

    let rec_id = RecoveryId::from_i32(recovery_id as i32)
        .map_err(|_| EvmError::InvalidSignature("invalid recovery id".to_string()))?;
    let signature = RecoverableSignature::from_compact(&compact, rec_id)
        .map_err(|e| EvmError::InvalidSignature(e.to_string()))?;
    let message = Message::from_digest(*signing_hash);

    let public_key = Secp256k1::new()
        .recover_ecdsa(&message, &signature)
        .map_err(|e| EvmError::InvalidSignature(format!("recovery failed: {e}")))?;
    Ok(pubkey_to_address(&public_key))
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

// Helper functions for RLP decoding

fn decode_u64(rlp: &Rlp, index: usize) -> EvmResult<u64> {
    rlp.at(index)
        .and_then(|r| r.as_val())
        .map_err(|e| rlp_error(&format!("field {index}"), e))
}

fn decode_u256(rlp: &Rlp, index: usize) -> EvmResult<U256> {
    let bytes = decode_bytes(rlp, index)?;
    if bytes.len() > 32 {
        return Err(EvmError::InvalidEncoding(format!(
            "U256 field {index} too large: {} bytes",
            bytes.len()
        )));
    }
    Ok(U256::from_big_endian(&bytes))
}

fn decode_bytes(rlp: &Rlp, index: usize) -> EvmResult<Vec<u8>> {
    rlp.at(index)
        .and_then(|r| r.as_val::<Vec<u8>>())
        .map_err(|e| rlp_error(&format!("field {index}"), e))
}

fn decode_bytes32(rlp: &Rlp, index: usize) -> EvmResult<[u8; 32]> {
    let bytes = decode_bytes(rlp, index)?;
    if bytes.len() > 32 {
        return Err(EvmError::InvalidEncoding(format!(
            "bytes32 field {index} too large: {} bytes",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(arr)
}

fn decode_optional_address(rlp: &Rlp, index: usize) -> EvmResult<Option<Address>> {
    let bytes = decode_bytes(rlp, index)?;
    if bytes.is_empty() {
        Ok(None)
    } else {
        Address::from_slice(&bytes).map(Some).ok_or_else(|| {
            EvmError::InvalidEncoding(format!(
                "invalid address length at field {index}: {} bytes",
                bytes.len()
            ))
        })
    }
}

fn rlp_error(field: &str, e: DecoderError) -> EvmError {
    EvmError::InvalidEncoding(format!("RLP decode error in {field}: {e}"))
}
