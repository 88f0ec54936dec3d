//! Wallet file persistence tests.
//!
//! Covers the encrypted round trip, legacy plaintext migration and the
//! refusal to overwrite unreadable files.

use hegemon_wallet::{EncryptedWalletFile, Wallet, WalletError, WalletVault, WALLET_FILE_VERSION};
use std::fs;

fn vault() -> WalletVault {
    WalletVault::with_identity("test-host:test-user")
}

#[test]
fn save_then_load_yields_same_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    let wallet = Wallet::generate();

    vault().save(&wallet, &path).unwrap();
    let loaded = vault().load(&path).unwrap();

    assert_eq!(loaded.address(), wallet.address());
    assert_eq!(loaded.public_key_hex(), wallet.public_key_hex());
}

#[test]
fn saved_record_has_expected_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    let wallet = Wallet::generate();
    vault().save(&wallet, &path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let record: EncryptedWalletFile = serde_json::from_str(&text).unwrap();

    assert_eq!(record.version, WALLET_FILE_VERSION);
    assert_eq!(hex::decode(&record.salt).unwrap().len(), 16);
    assert_eq!(hex::decode(&record.iv).unwrap().len(), 12);
    assert_eq!(hex::decode(&record.tag).unwrap().len(), 16);
    assert!(!text.contains(&wallet.export().private_key));
}

#[test]
fn legacy_plaintext_file_is_migrated_on_first_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    let wallet = Wallet::generate();
    fs::write(&path, serde_json::to_string(&wallet.export()).unwrap()).unwrap();

    let loaded = vault().load(&path).unwrap();
    assert_eq!(loaded.address(), wallet.address());

    let migrated: EncryptedWalletFile =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(migrated.version, WALLET_FILE_VERSION);

    let reloaded = vault().load(&path).unwrap();
    assert_eq!(reloaded.address(), wallet.address());
}

#[test]
fn unrecognized_format_is_a_distinct_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    fs::write(&path, r#"{"seed": "abc"}"#).unwrap();

    assert!(matches!(
        vault().load(&path),
        Err(WalletError::UnrecognizedFormat { .. })
    ));

    fs::write(&path, "not json at all").unwrap();
    assert!(matches!(
        vault().load(&path),
        Err(WalletError::UnrecognizedFormat { .. })
    ));
}

#[test]
fn unknown_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    fs::write(&path, r#"{"version": 9, "salt": "", "iv": "", "tag": "", "ciphertext": ""}"#).unwrap();

    assert!(matches!(
        vault().load(&path),
        Err(WalletError::UnsupportedVersion(9))
    ));
}

#[test]
fn load_or_create_never_replaces_an_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.json");
    fs::write(&path, "garbage").unwrap();

    assert!(vault().load_or_create(&path).is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");
}

#[test]
fn load_or_create_generates_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("wallet.json");

    let created = vault().load_or_create(&path).unwrap();
    let loaded = vault().load_or_create(&path).unwrap();

    assert_eq!(created.address(), loaded.address());
}
