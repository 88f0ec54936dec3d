//! Wallet-derived addresses.
//!
//! An address is a pure function of a public key: a fixed prefix followed by
//! the hex encoding of the first 20 bytes of `SHA-256(public_key)`.

use crate::hash::sha256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix carried by every address.
pub const ADDRESS_PREFIX: &str = "hgm";

const ADDRESS_BODY_BYTES: usize = 20;

/// Players are identified by the address of their wallet.
pub type PlayerId = Address;

/// Rejected address text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed address: {0}")]
pub struct AddressError(pub String);

/// Public identity of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Derive the address of a 32-byte public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = sha256(public_key);
        Self(format!(
            "{ADDRESS_PREFIX}{}",
            hex::encode(&digest[..ADDRESS_BODY_BYTES])
        ))
    }

    /// Wrap text without validation.
    ///
    /// Used for records decoded from peers, where a malformed address simply
    /// fails later signer checks.
    pub fn new_unchecked(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Whether the text has the prefix and 40 lowercase hex characters.
    pub fn is_well_formed(&self) -> bool {
        self.0
            .strip_prefix(ADDRESS_PREFIX)
            .is_some_and(|body| {
                body.len() == ADDRESS_BODY_BYTES * 2
                    && body
                        .bytes()
                        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
            })
    }

    /// The `hgm`-prefixed hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = Self(s.to_string());
        if address.is_well_formed() {
            Ok(address)
        } else {
            Err(AddressError(s.to_string()))
        }
    }
}
