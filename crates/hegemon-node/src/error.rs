//! Node errors.

use hegemon_chain::ChainError;
use hegemon_ledger::LedgerError;
use hegemon_store::StoreError;
use hegemon_sync::SyncError;
use hegemon_wallet::WalletError;
use hegemon_world::WorldError;

/// Everything a node operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The TOML config file is malformed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Filesystem failure outside the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fatal at startup; the wallet file needs operator attention.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Transfer or mint refused by the ledger.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A local block could not be built or committed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Shared-world document failure.
    #[error(transparent)]
    World(#[from] WorldError),

    /// Durable storage failed; state in memory is unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Outbound message could not be sent.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The simulation rules refused a command.
    #[error("command rejected by simulation rules: {0}")]
    Rules(String),

    /// Canonical encoding of a world record failed.
    #[error("record signing failed: {0}")]
    Signing(#[from] hegemon_core::CanonicalError),

    /// Genesis may only be the first block.
    #[error("the chain already has a genesis block")]
    DuplicateGenesis,

    /// The node task has exited.
    #[error("node is shutting down")]
    Stopped,
}

/// Node result.
pub type Result<T> = std::result::Result<T, NodeError>;
