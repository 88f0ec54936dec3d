//! Persistence errors.

use hegemon_core::PlayerId;

/// Persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Any redb failure.
    #[error("database: {0}")]
    Database(#[from] redb::Error),

    /// Creating the database directory failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record does not decode.
    #[error("record encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A different block is already stored at this chain position.
    #[error("block {index} for {player} conflicts with stored block {stored}")]
    BlockConflict {
        /// Chain owner
        player: PlayerId,
        /// Contested index
        index: u64,
        /// Hash of the block already stored
        stored: String,
    },

    /// The chain index points at a hash with no stored block.
    #[error("chain index references missing block {0}")]
    MissingBlock(String),

    /// The file was written by a newer build.
    #[error("database schema version {found} is newer than supported version {supported}")]
    FutureSchema {
        /// Version recorded in the file
        found: u64,
        /// Newest version this build can migrate to
        supported: u64,
    },
}

// redb reports each phase with its own error type; all of them fold into
// `redb::Error`.
macro_rules! from_redb {
    ($($source:ty),+) => {
        $(
            impl From<$source> for StoreError {
                fn from(err: $source) -> Self {
                    Self::Database(err.into())
                }
            }
        )+
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError
);

/// Store result.
pub type Result<T> = std::result::Result<T, StoreError>;
