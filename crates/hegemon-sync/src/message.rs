//! Wire messages.
//!
//! Every message travels as a JSON envelope `{type, senderId, timestamp,
//! payload}`. `type` selects the payload schema; binary payloads are hex
//! encoded.

use crate::error::{Result, SyncError};
use hegemon_chain::ActionBlock;
use hegemon_core::PlayerId;
use hegemon_ledger::{SignedReward, SignedTx};
use hegemon_world::CombatLogEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Topics
// =============================================================================

/// Publish/subscribe channels. Point-to-point traffic uses [`Topic::Direct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Newly appended action blocks
    Blocks,
    /// Signed token transactions
    Transactions,
    /// Shared world deltas
    State,
    /// Combat results
    Combat,
    /// Peer announcements
    Presence,
    /// Messages addressed to this peer only
    Direct,
}

impl Topic {
    /// Every gossip topic, excluding [`Topic::Direct`].
    pub const GOSSIP: [Topic; 5] = [
        Topic::Blocks,
        Topic::Transactions,
        Topic::State,
        Topic::Combat,
        Topic::Presence,
    ];

    /// Topic string as used on a pubsub transport.
    pub fn name(self) -> &'static str {
        match self {
            Topic::Blocks => "hegemon/blocks",
            Topic::Transactions => "hegemon/transactions",
            Topic::State => "hegemon/state",
            Topic::Combat => "hegemon/combat",
            Topic::Presence => "hegemon/presence",
            Topic::Direct => "hegemon/direct",
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Shared world changes the sender holds beyond `since`, or a full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBroadcast {
    /// Sender's heads after these changes, hex encoded
    pub heads: Vec<String>,
    /// Encoded changes, hex encoded
    #[serde(default)]
    pub changes: Vec<String>,
    /// Full document snapshot, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl StateBroadcast {
    /// Incremental update; `changes` are raw automerge change bytes.
    pub fn changes(heads: Vec<String>, changes: &[Vec<u8>]) -> Self {
        Self {
            heads,
            changes: changes.iter().map(hex::encode).collect(),
            snapshot: None,
        }
    }

    /// Full document, sent to new peers.
    pub fn snapshot(heads: Vec<String>, snapshot: &[u8]) -> Self {
        Self {
            heads,
            changes: Vec::new(),
            snapshot: Some(hex::encode(snapshot)),
        }
    }

    /// Hex-decode `changes`.
    pub fn decode_changes(&self) -> Result<Vec<Vec<u8>>> {
        self.changes.iter().map(|c| decode_hex(c, "changes")).collect()
    }

    /// Hex-decode `snapshot`, if present.
    pub fn decode_snapshot(&self) -> Result<Option<Vec<u8>>> {
        self.snapshot
            .as_deref()
            .map(|s| decode_hex(s, "snapshot"))
            .transpose()
    }
}

/// A transaction the sender admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBroadcast {
    /// The admitted transaction
    pub tx: SignedTx,
}

/// A reward the sender credited to itself. Shares the transaction topic so
/// it reaches peers ahead of any transfer that spends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardBroadcast {
    /// The signed issuance
    pub reward: SignedReward,
}

/// A signed combat result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatBroadcast {
    /// The sealed log entry
    pub entry: CombatLogEntry,
}

/// Advisory summary of the sender's own chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAnnounce {
    /// Sender's player address
    pub player_id: PlayerId,
    /// Settlement name
    pub name: String,
    /// Era the sender has reached
    pub era: u32,
    /// Blocks in the sender's own chain
    pub chain_length: u64,
}

/// A block the sender just appended to its own chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandBlock {
    /// The new head
    pub block: ActionBlock,
}

/// Ask a peer for `player_id`'s blocks starting at `from_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRequest {
    /// Chain owner
    pub player_id: PlayerId,
    /// First index wanted
    pub from_index: u64,
    /// Player address of whoever asked
    pub requester_id: PlayerId,
}

/// One page of a player's chain, in index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponse {
    /// Chain owner
    pub player_id: PlayerId,
    /// Up to `max_blocks_per_response` consecutive blocks
    pub blocks: Vec<ActionBlock>,
}

/// Message kinds, as carried in the envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// [`StateBroadcast`]
    State,
    /// [`TransactionBroadcast`]
    Transaction,
    /// [`RewardBroadcast`]
    Reward,
    /// [`CombatBroadcast`]
    CombatLog,
    /// [`PeerAnnounce`]
    PeerAnnounce,
    /// [`CommandBlock`]
    CommandBlock,
    /// [`ChainRequest`]
    ChainRequest,
    /// [`ChainResponse`]
    ChainResponse,
}

/// A decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Shared world delta or snapshot
    State(StateBroadcast),
    /// Token transfer
    Transaction(TransactionBroadcast),
    /// Token issuance
    Reward(RewardBroadcast),
    /// Combat result
    CombatLog(CombatBroadcast),
    /// Presence and chain length
    PeerAnnounce(PeerAnnounce),
    /// New chain head
    CommandBlock(CommandBlock),
    /// Ask for a chain range
    ChainRequest(ChainRequest),
    /// Answer to a chain request
    ChainResponse(ChainResponse),
}

impl Message {
    /// Envelope `type` for this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::State(_) => MessageKind::State,
            Message::Transaction(_) => MessageKind::Transaction,
            Message::Reward(_) => MessageKind::Reward,
            Message::CombatLog(_) => MessageKind::CombatLog,
            Message::PeerAnnounce(_) => MessageKind::PeerAnnounce,
            Message::CommandBlock(_) => MessageKind::CommandBlock,
            Message::ChainRequest(_) => MessageKind::ChainRequest,
            Message::ChainResponse(_) => MessageKind::ChainResponse,
        }
    }

    /// Topic the message is gossiped on.
    pub fn topic(&self) -> Topic {
        match self {
            Message::State(_) => Topic::State,
            Message::Transaction(_) | Message::Reward(_) => Topic::Transactions,
            Message::CombatLog(_) => Topic::Combat,
            Message::PeerAnnounce(_) => Topic::Presence,
            Message::CommandBlock(_) => Topic::Blocks,
            Message::ChainRequest(_) | Message::ChainResponse(_) => Topic::Direct,
        }
    }

    fn payload(&self) -> Result<Value> {
        let value = match self {
            Message::State(p) => serde_json::to_value(p)?,
            Message::Transaction(p) => serde_json::to_value(p)?,
            Message::Reward(p) => serde_json::to_value(p)?,
            Message::CombatLog(p) => serde_json::to_value(p)?,
            Message::PeerAnnounce(p) => serde_json::to_value(p)?,
            Message::CommandBlock(p) => serde_json::to_value(p)?,
            Message::ChainRequest(p) => serde_json::to_value(p)?,
            Message::ChainResponse(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    fn from_payload(kind: MessageKind, payload: Value) -> Result<Self> {
        let message = match kind {
            MessageKind::State => Message::State(serde_json::from_value(payload)?),
            MessageKind::Transaction => Message::Transaction(serde_json::from_value(payload)?),
            MessageKind::Reward => Message::Reward(serde_json::from_value(payload)?),
            MessageKind::CombatLog => Message::CombatLog(serde_json::from_value(payload)?),
            MessageKind::PeerAnnounce => Message::PeerAnnounce(serde_json::from_value(payload)?),
            MessageKind::CommandBlock => Message::CommandBlock(serde_json::from_value(payload)?),
            MessageKind::ChainRequest => Message::ChainRequest(serde_json::from_value(payload)?),
            MessageKind::ChainResponse => Message::ChainResponse(serde_json::from_value(payload)?),
        };
        Ok(message)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A message with its sender and send time.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Player address of the sender
    pub sender_id: PlayerId,
    /// Sender wall clock in milliseconds
    pub timestamp: u64,
    /// The payload
    pub message: Message,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: MessageKind,
    sender_id: PlayerId,
    timestamp: u64,
    payload: Value,
}

impl Envelope {
    /// Wrap `message`.
    pub fn new(sender_id: PlayerId, timestamp: u64, message: Message) -> Self {
        Self {
            sender_id,
            timestamp,
            message,
        }
    }

    /// Encode as wire JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let wire = WireEnvelope {
            kind: self.message.kind(),
            sender_id: self.sender_id.clone(),
            timestamp: self.timestamp,
            payload: self.message.payload()?,
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Decode wire JSON, dispatching the payload on `type`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let wire: WireEnvelope = serde_json::from_slice(bytes)?;
        Ok(Self {
            sender_id: wire.sender_id,
            timestamp: wire.timestamp,
            message: Message::from_payload(wire.kind, wire.payload)?,
        })
    }
}

fn decode_hex(text: &str, field: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|e| SyncError::Malformed(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn player(seed: u8) -> PlayerId {
        PlayerId::from_public_key(&[seed; 32])
    }

    #[test]
    fn envelope_has_wire_shape() {
        let envelope = Envelope::new(
            player(1),
            42,
            Message::ChainRequest(ChainRequest {
                player_id: player(2),
                from_index: 3,
                requester_id: player(1),
            }),
        );
        let value: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(value["type"], json!("chain_request"));
        assert_eq!(value["senderId"], json!(player(1).as_str()));
        assert_eq!(value["timestamp"], json!(42));
        assert_eq!(value["payload"]["fromIndex"], json!(3));

        assert_eq!(Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap(), envelope);
    }

    #[test]
    fn payload_must_match_its_type() {
        let bytes = serde_json::to_vec(&json!({
            "type": "peer_announce",
            "senderId": player(1).as_str(),
            "timestamp": 1,
            "payload": {"playerId": player(1).as_str(), "blocks": []}
        }))
        .unwrap();
        assert!(Envelope::from_bytes(&bytes).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let bytes = serde_json::to_vec(&json!({
            "type": "gossip_everything",
            "senderId": "x",
            "timestamp": 1,
            "payload": {}
        }))
        .unwrap();
        assert!(Envelope::from_bytes(&bytes).is_err());
    }

    #[test]
    fn state_changes_are_hex_on_the_wire() {
        let state = StateBroadcast::changes(vec![], &[vec![0xde, 0xad], vec![0x01]]);
        assert_eq!(state.changes, vec!["dead".to_string(), "01".to_string()]);
        assert_eq!(state.decode_changes().unwrap(), vec![vec![0xde, 0xad], vec![0x01]]);

        let bad = StateBroadcast {
            heads: vec![],
            changes: vec!["zz".to_string()],
            snapshot: None,
        };
        assert!(matches!(bad.decode_changes(), Err(SyncError::Malformed(_))));
    }

    #[test]
    fn requests_and_responses_go_direct() {
        let response = Message::ChainResponse(ChainResponse {
            player_id: player(1),
            blocks: vec![],
        });
        assert_eq!(response.topic(), Topic::Direct);
        assert!(!Topic::GOSSIP.contains(&Topic::Direct));
    }
}
