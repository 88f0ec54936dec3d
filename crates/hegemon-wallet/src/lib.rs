//! # Hegemon Wallet
//!
//! A wallet is the single cryptographic identity of an installation:
//!
//! - **Keys**: an Ed25519 key pair generated from the OS CSPRNG
//! - **Address**: derived from the public key (see [`hegemon_core::Address`])
//! - **Signatures**: 64-byte Ed25519 signatures rendered as 128 hex characters
//! - **Storage**: [`WalletVault`] seals the exported keys with AES-256-GCM under
//!   a key stretched by scrypt from host identity and a per-file salt

mod error;
mod keys;
mod vault;

pub use error::{Result, WalletError};
pub use keys::{verify, Wallet, WalletExport};
pub use vault::{EncryptedWalletFile, WalletVault, WALLET_FILE_VERSION};
