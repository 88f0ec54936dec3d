//! Persisted record shapes.

use hegemon_core::{Address, PlayerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A player's simulation state at one tick, with its content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Whose state this is
    pub player_id: PlayerId,
    /// Tick the state was taken at
    pub tick: u64,
    /// Hash committed to in the chain at this tick
    pub state_hash: String,
    /// The simulation state as JSON
    pub state: Value,
}

/// A peer this node has talked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Player address announced by the peer.
    pub address: Address,
    /// Transport-level peer identifier.
    pub peer_id: String,
    /// Settlement name announced by the peer.
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub last_seen: u64,
    /// Announcements received from the peer.
    pub success_count: u64,
}
