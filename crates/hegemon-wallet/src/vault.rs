//! Host-bound encrypted wallet files.
//!
//! The stored record is `{version, salt, iv, tag, ciphertext}` with every
//! field except `version` hex encoded. The AES-256-GCM key is stretched with
//! scrypt from `"{hostname}:{user}"` and a random per-file salt, so a copied
//! wallet file is useless on another machine or account.

use crate::error::{Result, WalletError};
use crate::keys::{Wallet, WalletExport};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use zeroize::{Zeroize, Zeroizing};

/// Current wallet file version.
pub const WALLET_FILE_VERSION: u64 = 2;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

// scrypt N = 2^14, r = 8, p = 1
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// On-disk encrypted wallet record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedWalletFile {
    /// Format version, currently [`WALLET_FILE_VERSION`]
    pub version: u64,
    /// 16-byte scrypt salt, hex
    pub salt: String,
    /// 12-byte AES-GCM nonce, hex
    pub iv: String,
    /// 16-byte AES-GCM authentication tag, hex
    pub tag: String,
    /// Encrypted [`WalletExport`] JSON without its tag, hex
    pub ciphertext: String,
}

/// `"{hostname}:{user}"` for the current process.
fn host_identity() -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "player".to_string());
    format!("{host}:{user}")
}

/// Reads and writes wallet files bound to one host identity.
pub struct WalletVault {
    identity: Zeroizing<String>,
}

impl WalletVault {
    /// Vault bound to this machine and user.
    pub fn for_host() -> Self {
        Self::with_identity(host_identity())
    }

    /// Vault bound to an explicit identity string.
    pub fn with_identity(identity: impl Into<String>) -> Self {
        Self {
            identity: Zeroizing::new(identity.into()),
        }
    }

    /// Encrypt `wallet` and write it to `path` with owner-only permissions.
    pub fn save(&self, wallet: &Wallet, path: &Path) -> Result<()> {
        let record = self.seal(wallet)?;
        let body = serde_json::to_string_pretty(&record)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let staging = path.with_extension("tmp");
        fs::write(&staging, body)?;
        restrict_permissions(&staging)?;
        fs::rename(&staging, path)?;

        tracing::debug!(address = %wallet.address(), path = %path.display(), "wallet saved");
        Ok(())
    }

    /// Load the wallet at `path`.
    ///
    /// A legacy plaintext `{privateKey, publicKey}` file is accepted once and
    /// immediately rewritten in the encrypted format. Anything else that is not
    /// a version 2 record is an error.
    pub fn load(&self, path: &Path) -> Result<Wallet> {
        let text = Zeroizing::new(fs::read_to_string(path)?);
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| WalletError::UnrecognizedFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Some(version) = value.get("version") {
            let version = version.as_u64().ok_or_else(|| WalletError::UnrecognizedFormat {
                path: path.to_path_buf(),
                reason: "version is not an integer".to_string(),
            })?;
            if version != WALLET_FILE_VERSION {
                return Err(WalletError::UnsupportedVersion(version));
            }
            let record: EncryptedWalletFile =
                serde_json::from_value(value).map_err(|e| WalletError::UnrecognizedFormat {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            return self.open(&record);
        }

        if value.get("privateKey").is_some() && value.get("publicKey").is_some() {
            let export: WalletExport =
                serde_json::from_value(value).map_err(|e| WalletError::UnrecognizedFormat {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            let wallet = Wallet::import(&export)?;
            self.save(&wallet, path)?;
            tracing::info!(
                address = %wallet.address(),
                path = %path.display(),
                "migrated legacy plaintext wallet to encrypted format"
            );
            return Ok(wallet);
        }

        Err(WalletError::UnrecognizedFormat {
            path: path.to_path_buf(),
            reason: "neither an encrypted record nor a legacy key pair".to_string(),
        })
    }

    /// Load the wallet at `path`, generating and saving one only when no file
    /// exists there.
    pub fn load_or_create(&self, path: &Path) -> Result<Wallet> {
        if path.exists() {
            return self.load(path);
        }
        let wallet = Wallet::generate();
        self.save(&wallet, path)?;
        tracing::info!(address = %wallet.address(), "generated new wallet");
        Ok(wallet)
    }

    fn seal(&self, wallet: &Wallet) -> Result<EncryptedWalletFile> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);

        let key = self.derive_key(&salt)?;
        let cipher = Aes256Gcm::new(&key);
        let plaintext = Zeroizing::new(serde_json::to_vec(&wallet.export())?);

        let mut sealed = cipher
            .encrypt(&iv.into(), plaintext.as_slice())
            .map_err(|_| WalletError::Encryption)?;
        // aes-gcm appends the tag; the file format keeps it separate.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedWalletFile {
            version: WALLET_FILE_VERSION,
            salt: hex::encode(salt),
            iv: hex::encode(iv),
            tag: hex::encode(tag),
            ciphertext: hex::encode(sealed),
        })
    }

    fn open(&self, record: &EncryptedWalletFile) -> Result<Wallet> {
        let salt = decode_field(&record.salt, "salt")?;
        let iv: [u8; IV_LEN] = decode_field(&record.iv, "iv")?
            .try_into()
            .map_err(|_| WalletError::InvalidKey("iv must be 12 bytes".to_string()))?;
        let tag = decode_field(&record.tag, "tag")?;
        if tag.len() != TAG_LEN {
            return Err(WalletError::InvalidKey("tag must be 16 bytes".to_string()));
        }
        let mut sealed = decode_field(&record.ciphertext, "ciphertext")?;
        sealed.extend_from_slice(&tag);

        let key = self.derive_key(&salt)?;
        let cipher = Aes256Gcm::new(&key);
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(&iv.into(), sealed.as_slice())
                .map_err(|_| WalletError::Decryption)?,
        );

        let export: WalletExport =
            serde_json::from_slice(&plaintext).map_err(|_| WalletError::Decryption)?;
        Wallet::import(&export)
    }

    fn derive_key(&self, salt: &[u8]) -> Result<Key<Aes256Gcm>> {
        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let mut derived = [0u8; 32];
        scrypt::scrypt(self.identity.as_bytes(), salt, &params, &mut derived)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let key: Key<Aes256Gcm> = derived.into();
        derived.zeroize();
        Ok(key)
    }
}

fn decode_field(text: &str, field: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|_| WalletError::InvalidKey(format!("{field} is not valid hex")))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
