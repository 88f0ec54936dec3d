//! Chain errors.

use crate::command::CommandError;
use hegemon_core::PlayerId;

/// Why a block was refused by a [`ChainBook`](crate::ChainBook).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The block is further ahead than the next local index.
    #[error("block {got} for {player} skips ahead of local head (expected index {expected_index})")]
    Gap {
        /// Chain owner
        player: PlayerId,
        /// Next index the local copy can accept
        expected_index: u64,
        /// Index the block carried
        got: u64,
    },

    /// `prevHash` does not match the local head.
    #[error("block {index} for {player} does not extend local head {expected}")]
    PrevHashMismatch {
        /// Chain owner
        player: PlayerId,
        /// Index the block carried
        index: u64,
        /// Hash of the local head
        expected: String,
        /// `prevHash` the block carried
        got: String,
    },

    /// An identical block is already stored.
    #[error("block {index} for {player} is already stored")]
    AlreadyKnown {
        /// Chain owner
        player: PlayerId,
        /// Stored index
        index: u64,
    },

    /// A different block is stored at the same index; the player forked.
    #[error("block {index} for {player} conflicts with the stored block at that index")]
    Conflict {
        /// Chain owner
        player: PlayerId,
        /// Contested index
        index: u64,
    },

    /// The carried hash is not the hash of the block's contents.
    #[error("block {index} hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch {
        /// Index the block carried
        index: u64,
        /// Hash carried in the block
        claimed: String,
        /// Hash recomputed locally
        computed: String,
    },

    /// Signature does not verify under the carried public key.
    #[error("block {index} for {player} carries an invalid signature")]
    BadSignature {
        /// Chain owner
        player: PlayerId,
        /// Index the block carried
        index: u64,
    },

    /// The public key does not derive the chain owner's address.
    #[error("block {index} for {player} is signed by a key that does not own the chain")]
    SignerMismatch {
        /// Claimed chain owner
        player: PlayerId,
        /// Index the block carried
        index: u64,
    },

    /// A non-genesis command at index 0, or a genesis command elsewhere.
    #[error("block {index} violates genesis rules: {reason}")]
    GenesisViolation {
        /// Index the block carried
        index: u64,
        /// Which rule was broken
        reason: &'static str,
    },

    /// The book changed between verify and commit.
    #[error("local head for {player} moved before block {index} was committed")]
    StaleHead {
        /// Chain owner
        player: PlayerId,
        /// Index of the block being committed
        index: u64,
    },

    /// The command's arguments do not decode.
    #[error(transparent)]
    InvalidCommand(#[from] CommandError),

    /// Canonical encoding of the block failed.
    #[error("block encoding failed: {0}")]
    Encoding(String),
}

impl ChainError {
    /// The block may be valid but the local copy is behind; request the
    /// missing range instead of discarding the player's history.
    pub fn needs_catch_up(&self) -> bool {
        matches!(self, Self::Gap { .. } | Self::PrevHashMismatch { .. })
    }

    /// Hash, signature or linkage failure on an incoming block.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::PrevHashMismatch { .. }
                | Self::Conflict { .. }
                | Self::HashMismatch { .. }
                | Self::BadSignature { .. }
                | Self::SignerMismatch { .. }
                | Self::GenesisViolation { .. }
        )
    }
}

impl From<hegemon_core::CanonicalError> for ChainError {
    fn from(err: hegemon_core::CanonicalError) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Chain result.
pub type Result<T> = std::result::Result<T, ChainError>;
