//! Synchronization errors.

use hegemon_core::PlayerId;

/// Synchronization failures.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A request to `peer` got no answer before its deadline.
    #[error("request for {player}'s chain timed out at peer {peer}")]
    Timeout {
        /// Peer the request went to
        peer: String,
        /// Whose chain was requested
        player: PlayerId,
    },

    /// The transport has no route to the peer.
    #[error("peer {0} is unreachable")]
    Unreachable(String),

    /// The local end of the transport shut down.
    #[error("transport closed")]
    Closed,

    /// A verified block could not be written to durable storage.
    #[error("block storage: {0}")]
    Storage(String),

    /// A message decoded but made no sense.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A message failed to encode or decode.
    #[error("message encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Sync result.
pub type Result<T> = std::result::Result<T, SyncError>;
