//! # Merkle Root
//!
//! Binary hash tree over leaf digests: each parent is `SHA-256(left || right)`.
//! Leaves are padded to a power of two (minimum two) with [`SENTINEL_HASH`];
//! the root of no leaves is the sentinel itself.

use shared_types::sha256;

pub const SENTINEL_HASH: [u8; 32] = [0u8; 32];

pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    sha256(&buf)
}

/// Root of the tree over `leaves` in the given order.
pub fn merkle_root(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return SENTINEL_HASH;
    }

    let padded = leaves.len().next_power_of_two().max(2);
    leaves.resize(padded, SENTINEL_HASH);

    while leaves.len() > 1 {
        leaves = leaves
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    leaves[0]
}

/// Leaf digest of a key-value pair; the key is length-prefixed so adjacent
/// pairs cannot be re-split.
pub fn leaf_hash(key: &[u8], value: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(4 + key.len() + value.len());
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    sha256(&buf)
}
