//! Ed25519 key pairs and signature helpers.

use crate::error::{Result, WalletError};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hegemon_core::Address;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An installation's key pair and the address derived from it.
///
/// The signing key is zeroized on drop by `ed25519-dalek`.
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Generate a fresh key pair from the operating system CSPRNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    fn from_secret(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Address derived from the public key.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Public key as 64 hex characters.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign `message`, returning the signature as 128 hex characters.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }

    /// Export both halves of the key pair as hex.
    pub fn export(&self) -> WalletExport {
        WalletExport {
            private_key: hex::encode(self.signing_key.to_bytes()),
            public_key: self.public_key_hex(),
        }
    }

    /// Import a previously exported key pair.
    ///
    /// The declared public key must match the one derived from the private key.
    pub fn import(export: &WalletExport) -> Result<Self> {
        let mut secret = decode_fixed::<32>(&export.private_key)
            .ok_or_else(|| WalletError::InvalidKey("private key must be 32 hex bytes".into()))?;
        let wallet = Self::from_secret(&secret);
        secret.zeroize();

        if wallet.public_key_hex() != export.public_key.to_ascii_lowercase() {
            return Err(WalletError::InvalidKey(
                "public key does not match private key".into(),
            ));
        }
        Ok(wallet)
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Hex key material as written by [`Wallet::export`].
///
/// This is also the legacy plaintext wallet file format.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct WalletExport {
    /// 32-byte Ed25519 secret, hex
    pub private_key: String,
    /// 32-byte Ed25519 public key, hex
    pub public_key: String,
}

impl fmt::Debug for WalletExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletExport")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Verify a hex signature over `message` against a hex public key.
///
/// Malformed hex, wrong lengths and invalid curve points all yield `false`.
pub fn verify(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    let Some(key_bytes) = decode_fixed::<32>(public_key_hex) else {
        return false;
    };
    let Some(sig_bytes) = decode_fixed::<64>(signature_hex) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(&sig_bytes)).is_ok()
}

fn decode_fixed<const N: usize>(text: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(text, &mut out).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let wallet = Wallet::generate();
        let sig = wallet.sign(b"settle the north");
        assert_eq!(sig.len(), 128);
        assert!(verify(b"settle the north", &sig, &wallet.public_key_hex()));
        assert!(!verify(b"settle the south", &sig, &wallet.public_key_hex()));
    }

    #[test]
    fn verify_is_false_for_malformed_inputs() {
        let wallet = Wallet::generate();
        let sig = wallet.sign(b"m");
        let pk = wallet.public_key_hex();

        assert!(!verify(b"m", "zz", &pk));
        assert!(!verify(b"m", &sig[..126], &pk));
        assert!(!verify(b"m", &sig, "not-hex"));
        assert!(!verify(b"m", &sig, &pk[..62]));
        assert!(!verify(b"m", &sig, &Wallet::generate().public_key_hex()));
    }

    #[test]
    fn export_import_roundtrip_preserves_identity() {
        let wallet = Wallet::generate();
        let restored = Wallet::import(&wallet.export()).unwrap();
        assert_eq!(restored.address(), wallet.address());
        assert_eq!(restored.public_key_hex(), wallet.public_key_hex());
    }

    #[test]
    fn import_rejects_mismatched_public_key() {
        let mut export = Wallet::generate().export();
        export.public_key = Wallet::generate().public_key_hex();
        assert!(matches!(
            Wallet::import(&export),
            Err(WalletError::InvalidKey(_))
        ));
    }

    #[test]
    fn debug_output_never_contains_private_key() {
        let wallet = Wallet::generate();
        let export = wallet.export();
        assert!(!format!("{wallet:?}").contains(&export.private_key));
        assert!(!format!("{export:?}").contains(&export.private_key));
    }
}
