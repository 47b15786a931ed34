//! # Application Root
//!
//! ```text
//! aux_db_root = SHA-256( staking ‖ governance ‖ schedule_tx )   (table digests)
//! app_root    = RIPEMD-160( eth_root ‖ native_root ‖ aux_db_root )
//! ```
//!
//! A failed EVM commit has no `eth_root` and contributes no bytes.

use shared_types::{ripemd160, sha256};

/// Digest over the relational stores, in fixed order.
pub fn aux_db_root(table_digests: &[[u8; 32]]) -> [u8; 32] {
    sha256(&table_digests.concat())
}

pub fn app_root(eth_root: &[u8], native_root: &[u8], aux_db_root: &[u8]) -> [u8; 20] {
    ripemd160(&[eth_root, native_root, aux_db_root].concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_input_moves_the_root() {
        let base = app_root(&[1; 32], &[2; 32], &[3; 32]);
        assert_ne!(base, app_root(&[9; 32], &[2; 32], &[3; 32]));
        assert_ne!(base, app_root(&[1; 32], &[9; 32], &[3; 32]));
        assert_ne!(base, app_root(&[1; 32], &[2; 32], &[9; 32]));
        assert_eq!(base, app_root(&[1; 32], &[2; 32], &[3; 32]));
    }

    #[test]
    fn test_aux_root_is_order_sensitive() {
        let a = aux_db_root(&[[1; 32], [2; 32]]);
        let b = aux_db_root(&[[2; 32], [1; 32]]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_eth_root_is_accepted() {
        let root = app_root(&[], &[2; 32], &[3; 32]);
        assert_eq!(root.len(), 20);
        assert_ne!(root, app_root(&[0; 32], &[2; 32], &[3; 32]));
    }
}
