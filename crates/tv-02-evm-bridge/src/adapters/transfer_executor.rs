//! # Value-Transfer Executor
//!
//! An [`Executor`] that understands plain value transfers and contract
//! creation without running bytecode. Gas used is always the intrinsic gas.

use num_bigint::BigInt;
use rlp::RlpStream;
use sha3::{Digest, Keccak256};
use shared_types::{Address, Hash};
use tracing::debug;

use crate::domain::{BlockContext, EthTransaction, Receipt, ScheduledCall};
use crate::errors::{EvmError, EvmResult};
use crate::ports::{Executor, WorldState};

#[derive(Debug, Clone, Copy, Default)]
pub struct TransferExecutor;

impl TransferExecutor {
    pub fn new() -> Self {
        Self
    }
}

/// Address of a contract created by `sender` at `nonce`.
pub fn contract_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.0.to_vec());
    stream.append(&nonce);
    let hash = Keccak256::digest(stream.as_raw());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address(bytes)
}

impl Executor for TransferExecutor {
    fn execute(
        &self,
        state: &mut dyn WorldState,
        tx: &EthTransaction,
        ctx: &BlockContext,
    ) -> EvmResult<Receipt> {
        let gas_used = tx.intrinsic_gas();
        if gas_used > tx.gas_limit {
            return Err(EvmError::IntrinsicGas {
                gas: tx.gas_limit,
                required: gas_used,
            });
        }

        let (callee_has_code, callee_balance) = match tx.to {
            Some(to) => (state.has_code(&to), state.balance(&to)),
            None => (false, Default::default()),
        };
        let payer = tx
            .gas_payer(&state.balance(&tx.sender), callee_has_code, &callee_balance)
            .ok_or_else(|| EvmError::InsufficientFunds {
                balance: state.balance(&tx.sender),
                cost: tx.cost(),
            })?;

        // Buy gas and bump the nonce before running the call.
        let prepaid = BigInt::from(tx.gas_limit) * &tx.gas_price;
        state.sub_balance(&payer, &prepaid);
        state.set_nonce(&tx.sender, tx.nonce + 1);

        let snapshot = state.snapshot();
        let success = if state.balance(&tx.sender) < tx.value {
            false
        } else {
            let recipient = match tx.to {
                Some(to) => to,
                None => {
                    let created = contract_address(&tx.sender, tx.nonce);
                    state.set_code(&created, tx.data.clone());
                    created
                }
            };
            state.sub_balance(&tx.sender, &tx.value);
            state.add_balance(&recipient, &tx.value);
            true
        };
        if !success {
            state.revert_to(snapshot);
        }

        let refund = BigInt::from(tx.gas_limit - gas_used) * &tx.gas_price;
        state.add_balance(&payer, &refund);

        debug!(
            hash = %tx.hash,
            height = ctx.height,
            gas_used,
            success,
            "Executed transaction"
        );

        Ok(Receipt {
            tx_hash: tx.hash,
            gas_used,
            success,
            logs: Vec::new(),
            scheduled: Vec::new(),
        })
    }

    fn execute_scheduled(
        &self,
        state: &mut dyn WorldState,
        call: &ScheduledCall,
        parent: Hash,
        ctx: &BlockContext,
    ) -> EvmResult<Receipt> {
        if !state.exists(&call.receiver) {
            return Err(EvmError::UnknownAccount(call.receiver));
        }
        debug!(
            parent = %parent,
            receiver = %call.receiver,
            height = ctx.height,
            "Executed scheduled call"
        );
        Ok(Receipt {
            tx_hash: parent,
            gas_used: 0,
            success: true,
            logs: Vec::new(),
            scheduled: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryWorldState;
    use crate::domain::{address_of, UnsignedTransaction};
    use primitive_types::U256;
    use secp256k1::SecretKey;
    use shared_types::Amount;

    #[test]
    fn test_transfer_charges_intrinsic_gas_only() {
        let key = SecretKey::from_slice(&[3; 32]).unwrap();
        let sender = address_of(&key);
        let to = Address([9; 20]);
        let mut state = InMemoryWorldState::with_balances([(sender, Amount::from(1_000_000))]);

        let raw = UnsignedTransaction::transfer(0, to, U256::from(500), U256::from(2), 30_000)
            .sign(&key, 18);
        let tx = EthTransaction::decode(&raw).unwrap();
        let receipt = TransferExecutor
            .execute(&mut state, &tx, &BlockContext::default())
            .unwrap();

        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(state.balance(&to), Amount::from(500));
        assert_eq!(state.balance(&sender), Amount::from(1_000_000 - 500 - 42_000));
        assert_eq!(state.nonce(&sender), 1);
    }

    #[test]
    fn test_contract_callee_pays_gas_when_sender_cannot() {
        let key = SecretKey::from_slice(&[4; 32]).unwrap();
        let sender = address_of(&key);
        let contract = Address([9; 20]);
        let mut state = InMemoryWorldState::with_balances([
            (sender, Amount::from(100)),
            (contract, Amount::from(1_000_000)),
        ]);
        state.set_code(&contract, vec![0x60, 0x00]);

        let raw = UnsignedTransaction::transfer(0, contract, U256::from(100), U256::from(2), 21_000)
            .sign(&key, 18);
        let tx = EthTransaction::decode(&raw).unwrap();
        let receipt = TransferExecutor
            .execute(&mut state, &tx, &BlockContext::default())
            .unwrap();

        assert!(receipt.success);
        assert_eq!(state.balance(&sender), Amount::from(0));
        assert_eq!(state.balance(&contract), Amount::from(1_000_000 - 42_000 + 100));
        assert_eq!(state.nonce(&sender), 1);
    }

    #[test]
    fn test_unpayable_transaction_rejected() {
        let key = SecretKey::from_slice(&[5; 32]).unwrap();
        let sender = address_of(&key);
        let mut state = InMemoryWorldState::with_balances([(sender, Amount::from(50_000))]);

        let raw = UnsignedTransaction::transfer(0, Address([9; 20]), U256::from(40_000), U256::one(), 21_000)
            .sign(&key, 18);
        let tx = EthTransaction::decode(&raw).unwrap();
        let result = TransferExecutor.execute(&mut state, &tx, &BlockContext::default());

        assert!(matches!(result, Err(EvmError::InsufficientFunds { .. })));
        assert_eq!(state.balance(&sender), Amount::from(50_000));
    }

    #[test]
    fn test_contract_address_depends_on_nonce() {
        let sender = Address([1; 20]);
        assert_ne!(contract_address(&sender, 0), contract_address(&sender, 1));
    }
}
