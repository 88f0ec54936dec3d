//! Transaction admission tests.
//!
//! Validation order, fee burning and journal replay.

use hegemon_core::Address;
use hegemon_ledger::{Ledger, LedgerEntry, Reward, TxDraft, TxRejection, TxValidator};
use hegemon_wallet::Wallet;
use proptest::prelude::*;

fn funded(wallet: &Wallet, amount: u64) -> Ledger {
    let mut ledger = Ledger::new();
    ledger.mint(wallet.address(), amount).unwrap();
    ledger
}

fn transfer(from: &Wallet, to: &Address, amount: u64, fee: u64, nonce: u64) -> hegemon_ledger::SignedTx {
    TxDraft::transfer(from.address().clone(), to.clone(), amount, fee, nonce, 1)
        .sign(from)
        .unwrap()
}

#[test]
fn valid_transfer_passes_and_applies() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let mut ledger = funded(&alice, 100);

    let tx = transfer(&alice, bob.address(), 30, 1, 0);
    assert_eq!(TxValidator::validate(&tx, &ledger), Ok(()));
    ledger.admit(&tx).unwrap();

    assert_eq!(ledger.balance(alice.address()), 69);
    assert_eq!(ledger.balance(bob.address()), 30);
    assert_eq!(ledger.total_supply(), 99);
}

#[test]
fn signature_is_checked_before_everything_else() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let ledger = Ledger::new();

    // Empty balance, wrong nonce and zero amount would all fail too.
    let mut tx = transfer(&alice, bob.address(), 0, 1, 7);
    tx.signature = bob.sign(b"something else");

    assert_eq!(
        TxValidator::validate(&tx, &ledger),
        Err(TxRejection::InvalidSignature)
    );
}

#[test]
fn signing_with_someone_elses_key_is_an_invalid_signature() {
    let alice = Wallet::generate();
    let mallory = Wallet::generate();
    let ledger = funded(&alice, 100);

    let draft = TxDraft::transfer(alice.address().clone(), mallory.address().clone(), 50, 0, 0, 1);
    let forged = draft.sign(&mallory).unwrap();

    assert_eq!(
        TxValidator::validate(&forged, &ledger),
        Err(TxRejection::InvalidSignature)
    );
}

#[test]
fn malformed_signature_is_rejected_not_panicking() {
    let alice = Wallet::generate();
    let ledger = funded(&alice, 100);
    let mut tx = transfer(&alice, Wallet::generate().address(), 1, 0, 0);
    tx.signature = "xyz".to_string();
    tx.public_key = "00".to_string();

    assert_eq!(
        TxValidator::validate(&tx, &ledger),
        Err(TxRejection::InvalidSignature)
    );
}

#[test]
fn balance_is_checked_before_nonce() {
    let alice = Wallet::generate();
    let ledger = funded(&alice, 10);
    let tx = transfer(&alice, Wallet::generate().address(), 10, 1, 3);

    assert_eq!(
        TxValidator::validate(&tx, &ledger),
        Err(TxRejection::InsufficientBalance)
    );
}

#[test]
fn nonce_must_match_exactly() {
    let alice = Wallet::generate();
    let ledger = funded(&alice, 10);

    let ahead = transfer(&alice, Wallet::generate().address(), 1, 0, 1);
    let err = TxValidator::validate(&ahead, &ledger).unwrap_err();
    assert_eq!(err, TxRejection::InvalidNonce { expected: 0, got: 1 });
    assert_eq!(err.to_string(), "Invalid nonce: expected 0, got 1");
}

#[test]
fn zero_amount_is_rejected_last() {
    let alice = Wallet::generate();
    let ledger = funded(&alice, 10);
    let tx = transfer(&alice, Wallet::generate().address(), 0, 1, 0);

    let err = TxValidator::validate(&tx, &ledger).unwrap_err();
    assert_eq!(err, TxRejection::NonPositiveAmount);
    assert_eq!(err.to_string(), "Amount must be positive");
}

#[test]
fn validation_never_mutates() {
    let alice = Wallet::generate();
    let ledger = funded(&alice, 10);
    let before = ledger.clone();
    let tx = transfer(&alice, Wallet::generate().address(), 5, 1, 0);

    TxValidator::validate(&tx, &ledger).unwrap();
    assert_eq!(ledger, before);
}

#[test]
fn replayed_transaction_fails_on_nonce() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let mut ledger = funded(&alice, 100);
    let tx = transfer(&alice, bob.address(), 10, 0, 0);

    ledger.admit(&tx).unwrap();
    let before = ledger.clone();
    let err = ledger.admit(&tx).unwrap_err();

    assert_eq!(
        err,
        hegemon_ledger::LedgerError::Rejected(TxRejection::InvalidNonce { expected: 1, got: 0 })
    );
    assert_eq!(ledger, before);
}

#[test]
fn journal_replay_reproduces_ledger() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let journal = vec![
        LedgerEntry::Mint {
            reward: Reward::new(alice.address().clone(), 100, 0, "settlement founded")
                .unwrap()
                .sign(&alice)
                .unwrap(),
        },
        LedgerEntry::Transfer {
            tx: transfer(&alice, bob.address(), 30, 1, 0),
        },
        LedgerEntry::Transfer {
            tx: transfer(&alice, bob.address(), 9, 0, 1),
        },
    ];

    let ledger = Ledger::replay(&journal).unwrap();

    assert_eq!(ledger.balance(alice.address()), 60);
    assert_eq!(ledger.balance(bob.address()), 39);
    assert_eq!(ledger.nonce(alice.address()), 2);

    let encoded = serde_json::to_string(&journal).unwrap();
    let decoded: Vec<LedgerEntry> = serde_json::from_str(&encoded).unwrap();
    assert_eq!(Ledger::replay(&decoded).unwrap(), ledger);
}

#[test]
fn sign_transfer_uses_the_current_nonce() {
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let mut ledger = funded(&alice, 50);

    let first = ledger.sign_transfer(&alice, bob.address(), 5, 0, 3).unwrap();
    ledger.admit(&first).unwrap();
    let second = ledger.sign_transfer(&alice, bob.address(), 5, 0, 4).unwrap();

    assert_eq!(first.tx.nonce, 0);
    assert_eq!(second.tx.nonce, 1);
    ledger.admit(&second).unwrap();
    assert_eq!(ledger.balance(bob.address()), 10);
}

proptest! {
    #[test]
    fn transfer_conserves_value_minus_fee(
        start in 0u64..1_000_000,
        other in 0u64..1_000_000,
        amount in 0u64..1_000_000,
        fee in 0u64..10_000,
    ) {
        prop_assume!(amount + fee <= start);
        let from = Address::from_public_key(&[1u8; 32]);
        let to = Address::from_public_key(&[2u8; 32]);
        let mut ledger = Ledger::new();
        ledger.credit(&from, start).unwrap();
        ledger.credit(&to, other).unwrap();
        let supply = ledger.total_supply();

        ledger.apply_transfer(&from, &to, amount, fee).unwrap();

        prop_assert_eq!(ledger.balance(&from), start - amount - fee);
        prop_assert_eq!(ledger.balance(&to), other + amount);
        prop_assert_eq!(ledger.total_supply(), supply - u128::from(fee));
    }

    #[test]
    fn overdraft_never_changes_state(start in 0u64..1_000, amount in 0u64..2_000) {
        prop_assume!(amount > start);
        let from = Address::from_public_key(&[3u8; 32]);
        let mut ledger = Ledger::new();
        ledger.credit(&from, start).unwrap();
        let before = ledger.clone();

        prop_assert!(ledger.debit(&from, amount).is_err());
        prop_assert_eq!(ledger, before);
    }
}
