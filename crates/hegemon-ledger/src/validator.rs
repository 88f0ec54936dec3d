//! Pure admission rules for signed transactions.

use crate::error::TxRejection;
use crate::ledger::Ledger;
use crate::tx::SignedTx;
use hegemon_core::Address;

/// Stateless transaction validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxValidator;

impl TxValidator {
    /// Check `signed` against `ledger` without mutating either.
    ///
    /// Checks run in this order and the first failure is returned:
    /// 1. the signature verifies over the serialized transaction with the
    ///    declared public key, and that key belongs to `from`
    /// 2. `balance(from) >= amount + fee`
    /// 3. `nonce == nonce(from)`
    /// 4. `amount > 0`
    pub fn validate(signed: &SignedTx, ledger: &Ledger) -> Result<(), TxRejection> {
        let tx = &signed.tx;

        let signature_ok = tx.signing_bytes().is_ok_and(|bytes| {
            hegemon_wallet::verify(&bytes, &signed.signature, &signed.public_key)
        });
        if !signature_ok || !signer_owns(&signed.public_key, &tx.from) {
            return Err(TxRejection::InvalidSignature);
        }

        let required = tx.amount.checked_add(tx.fee);
        if required.map_or(true, |required| ledger.balance(&tx.from) < required) {
            return Err(TxRejection::InsufficientBalance);
        }

        let expected = ledger.nonce(&tx.from);
        if tx.nonce != expected {
            return Err(TxRejection::InvalidNonce {
                expected,
                got: tx.nonce,
            });
        }

        if tx.amount == 0 {
            return Err(TxRejection::NonPositiveAmount);
        }

        Ok(())
    }
}

pub(crate) fn signer_owns(public_key_hex: &str, from: &Address) -> bool {
    let mut key = [0u8; 32];
    hex::decode_to_slice(public_key_hex, &mut key).is_ok() && Address::from_public_key(&key) == *from
}
