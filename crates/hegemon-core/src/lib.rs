//! # Hegemon Core
//!
//! Primitives shared by the trust and synchronization layer:
//!
//! - **Hashing**: SHA-256 digests rendered as lowercase hex
//! - **Canonical encoding**: JSON with lexicographically sorted object keys, so
//!   content hashes are stable regardless of field insertion order
//! - **Identifiers**: [`Address`], the wallet-derived identity of a player
//! - **Time**: wall clock helpers in milliseconds

/// Wallet-derived player addresses.
pub mod address;
/// SHA-256 and canonical JSON.
pub mod hash;
/// Wall clock helpers.
pub mod time;

pub use address::{Address, AddressError, PlayerId, ADDRESS_PREFIX};
pub use hash::{canonical_json, hash_canonical, sha256, sha256_hex, CanonicalError};
pub use time::now_millis;

/// `prevHash` carried by the block at index 0 of every action chain.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Length in hex characters of every content hash produced by this crate.
pub const HASH_HEX_LEN: usize = 64;
