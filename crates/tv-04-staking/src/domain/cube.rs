//! # Cube Signature
//!
//! Delegations may be pre-authorized by a hardware "cube" holding an RSA key.
//! The cube signs `sha256("<lowercase 0x address>|<nonce>")` with textbook
//! RSA (no padding); verification raises the signature to the public exponent
//! and compares the result with the digest as integers.

use num_bigint::BigUint;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use shared_types::{sha256, Address};
use tv_01_params::CubePubKey;

use crate::errors::{StakeError, StakeResult};

/// Message signed by the cube for `address` at native nonce `nonce`.
pub fn cube_message(address: &Address, nonce: u64) -> String {
    format!("{}|{}", address.to_string().to_lowercase(), nonce)
}

/// Verifies `sig` (hex) for `(address, nonce)` against the key of `cube_batch`.
pub fn verify_cube_signature(
    keys: &[CubePubKey],
    address: &Address,
    nonce: u64,
    cube_batch: &str,
    sig: &str,
) -> StakeResult<()> {
    let key = keys
        .iter()
        .find(|k| k.cube_batch == cube_batch)
        .ok_or_else(|| StakeError::CubeSignature(format!("unknown cube batch {cube_batch:?}")))?;

    let public = RsaPublicKey::from_public_key_pem(&key.pub_key)
        .map_err(|e| StakeError::CubeSignature(format!("bad public key: {e}")))?;
    let sig_bytes = hex::decode(sig.trim_start_matches("0x"))
        .map_err(|e| StakeError::CubeSignature(format!("bad signature encoding: {e}")))?;

    let n = BigUint::from_bytes_be(&public.n().to_bytes_be());
    let e = BigUint::from_bytes_be(&public.e().to_bytes_be());
    let s = BigUint::from_bytes_be(&sig_bytes);
    if s >= n {
        return Err(StakeError::CubeSignature("signature out of range".into()));
    }

    let recovered = s.modpow(&e, &n);
    let digest = BigUint::from_bytes_be(&sha256(cube_message(address, nonce).as_bytes()));
    if recovered != digest {
        return Err(StakeError::CubeSignature("signature mismatch".into()));
    }
    Ok(())
}
