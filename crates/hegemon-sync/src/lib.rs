//! # Hegemon Sync
//!
//! How peers converge without a server:
//!
//! - **Messages**: every payload travels in an [`Envelope`] with its sender
//!   and send time, JSON encoded, on the [`Topic`] for its kind.
//! - **Transport**: [`Transport`] is the contract the node needs from the
//!   peer network; [`MemoryNetwork`] implements it in-process.
//! - **Chains**: [`ChainSync`] accepts gossiped blocks, serves ranges and
//!   fetches missing ones, retrying slow peers through [`PeerBook`] backoff.
//!
//! Shared world and transaction broadcasts need no protocol state: world
//! deltas merge in any order and transactions are admitted by the ledger.

mod error;
mod message;
mod peers;
mod pending;
mod protocol;
mod transport;

pub use error::{Result, SyncError};
pub use message::{
    ChainRequest, ChainResponse, CombatBroadcast, CommandBlock, Envelope, Message, MessageKind,
    PeerAnnounce, RewardBroadcast, StateBroadcast, Topic, TransactionBroadcast,
};
pub use peers::{BackoffConfig, PeerBook, PeerMetadata, PeerStatus};
pub use pending::{PendingRequest, PendingRequests};
pub use protocol::{BlockOutcome, BlockSink, ChainSync, OutboundRequest, ResponseOutcome, SyncConfig};
pub use transport::{Inbound, MemoryNetwork, MemoryTransport, PeerEvent, PeerId, Transport};
