//! Wallet errors.

use std::path::PathBuf;

/// Errors raised while creating, importing or storing a wallet.
///
/// Every variant that concerns an existing wallet file is fatal at startup:
/// the node never replaces an unreadable file with a fresh identity.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Reading or writing the wallet file failed.
    #[error("wallet file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file is neither an encrypted wallet nor a legacy export.
    #[error("unrecognized wallet file format at {path}: {reason}")]
    UnrecognizedFormat {
        /// The offending file
        path: PathBuf,
        /// Why neither format parsed
        reason: String,
    },

    /// Written by a newer release.
    #[error("unsupported wallet file version {0}")]
    UnsupportedVersion(u64),

    /// Key bytes have the wrong length or the halves do not match.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// scrypt rejected its parameters.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// AES-GCM refused to seal the key material.
    #[error("wallet encryption failed")]
    Encryption,

    /// Wrong host identity, or the file was modified.
    #[error("wallet decryption failed: wrong host identity or tampered file")]
    Decryption,

    /// JSON encoding or decoding failed.
    #[error("wallet serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;
