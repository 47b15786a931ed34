//! # Canonical Encoding
//!
//! Explicit, field-ordered byte encoding for anything that contributes to a
//! root hash. Each entity writes its fields in a fixed order; every variable
//! length field is prefixed with its big-endian `u32` length so distinct
//! field sequences can never collide.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::entities::{Address, Hash};
use crate::numeric::{format_ratio, Amount, Ratio};

/// Builder for a canonical byte string.
#[derive(Debug, Default, Clone)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    pub fn str(self, value: &str) -> Self {
        self.bytes(value.as_bytes())
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i64(mut self, value: i64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn bool(mut self, value: bool) -> Self {
        self.buf.push(u8::from(value));
        self
    }

    pub fn address(self, value: &Address) -> Self {
        self.bytes(value.as_bytes())
    }

    pub fn hash(self, value: &Hash) -> Self {
        self.bytes(value.as_bytes())
    }

    /// Two's-complement big-endian bytes, so negative values stay distinct.
    pub fn amount(self, value: &Amount) -> Self {
        self.bytes(&value.to_signed_bytes_be())
    }

    pub fn ratio(self, value: &Ratio) -> Self {
        self.str(&format_ratio(value))
    }

    pub fn opt_address(self, value: Option<&Address>) -> Self {
        match value {
            Some(addr) => self.bool(true).address(addr),
            None => self.bool(false),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}
