//! Signed, hash-linked action blocks.

use crate::command::ActionCommand;
use crate::error::{ChainError, Result};
use hegemon_core::{hash_canonical, Address, PlayerId, GENESIS_PREV_HASH};
use hegemon_wallet::Wallet;
use serde::{Deserialize, Serialize};

/// One signed entry of a player's action chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBlock {
    /// Canonical hash of every other field except `signature`
    pub hash: String,
    /// `hash` of the block at `index - 1`, or zeros for genesis
    pub prev_hash: String,
    /// Position in the chain, starting at 0
    pub index: u64,
    /// Owner of the chain
    pub player_id: PlayerId,
    /// The action this block records
    pub command: ActionCommand,
    /// Simulation state hash after applying `command`
    pub state_hash: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Ed25519 signature over `hash`, hex
    pub signature: String,
    /// Signing key, hex; must derive `player_id`
    pub public_key: String,
}

/// Fields covered by the block hash: everything except `hash` and
/// `signature`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader<'a> {
    prev_hash: &'a str,
    index: u64,
    player_id: &'a PlayerId,
    command: &'a ActionCommand,
    state_hash: &'a str,
    timestamp: u64,
    public_key: &'a str,
}

impl ActionBlock {
    /// Build, hash and sign the block that follows `prev`.
    ///
    /// With no `prev` the block is the genesis block of the wallet's chain.
    pub fn seal(
        wallet: &Wallet,
        prev: Option<&ActionBlock>,
        command: ActionCommand,
        state_hash: impl Into<String>,
        timestamp: u64,
    ) -> Result<Self> {
        let (index, prev_hash) = match prev {
            Some(prev) => (prev.index + 1, prev.hash.clone()),
            None => (0, GENESIS_PREV_HASH.to_string()),
        };
        let mut block = Self {
            hash: String::new(),
            prev_hash,
            index,
            player_id: wallet.address().clone(),
            command,
            state_hash: state_hash.into(),
            timestamp,
            signature: String::new(),
            public_key: wallet.public_key_hex(),
        };
        block.hash = block.compute_hash()?;
        block.signature = wallet.sign(block.hash.as_bytes());
        Ok(block)
    }

    /// Recompute the content hash from the header fields.
    pub fn compute_hash(&self) -> Result<String> {
        Ok(hash_canonical(&BlockHeader {
            prev_hash: &self.prev_hash,
            index: self.index,
            player_id: &self.player_id,
            command: &self.command,
            state_hash: &self.state_hash,
            timestamp: self.timestamp,
            public_key: &self.public_key,
        })?)
    }

    /// Whether `signature` verifies over `hash` with `publicKey`.
    pub fn verify_signature(&self) -> bool {
        hegemon_wallet::verify(self.hash.as_bytes(), &self.signature, &self.public_key)
    }

    /// Whether `publicKey` is the key behind `playerId`.
    pub fn signer_owns_chain(&self) -> bool {
        let mut key = [0u8; 32];
        if hex::decode_to_slice(&self.public_key, &mut key).is_err() {
            return false;
        }
        Address::from_public_key(&key) == self.player_id
    }

    /// Index 0.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Self-contained checks that need no knowledge of the local chain:
    /// genesis shape, hash recomputation, signer binding and signature.
    pub fn check_integrity(&self) -> Result<()> {
        if self.is_genesis() {
            if self.prev_hash != GENESIS_PREV_HASH {
                return Err(ChainError::GenesisViolation {
                    index: self.index,
                    reason: "genesis block must carry the sentinel prevHash",
                });
            }
            if !self.command.kind().is_genesis() {
                return Err(ChainError::GenesisViolation {
                    index: self.index,
                    reason: "genesis block must carry a genesis command",
                });
            }
        } else if self.command.kind().is_genesis() {
            return Err(ChainError::GenesisViolation {
                index: self.index,
                reason: "genesis command outside index 0",
            });
        }

        let computed = self.compute_hash()?;
        if computed != self.hash {
            return Err(ChainError::HashMismatch {
                index: self.index,
                claimed: self.hash.clone(),
                computed,
            });
        }
        if !self.signer_owns_chain() {
            return Err(ChainError::SignerMismatch {
                player: self.player_id.clone(),
                index: self.index,
            });
        }
        if !self.verify_signature() {
            return Err(ChainError::BadSignature {
                player: self.player_id.clone(),
                index: self.index,
            });
        }
        Ok(())
    }
}
