//! Peer transport contract and an in-memory implementation.
//!
//! Connection setup, encryption and discovery live outside this crate; the
//! node only needs publish/subscribe, point-to-point send and peer
//! connectivity events. [`MemoryNetwork`] provides all of that in-process
//! for tests and local simulation, with links that can be cut on demand.
//!
//! Delivery into a peer's inbox never waits: the network lock is held while
//! fanning out, so a full inbox drops the message and a closed one is
//! forgotten.

use crate::error::{Result, SyncError};
use crate::message::Topic;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

/// Transport-level peer identifier.
pub type PeerId = String;

const CHANNEL_CAPACITY: usize = 256;

/// Bytes received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Sender
    pub from: PeerId,
    /// Topic it arrived on; `Direct` for point-to-point sends
    pub topic: Topic,
    /// Encoded [`Envelope`](crate::Envelope)
    pub bytes: Vec<u8>,
}

/// Connectivity change reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A peer became reachable.
    Connected(PeerId),
    /// A peer went away.
    Disconnected(PeerId),
}

/// What the node needs from the network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// This peer's transport identifier.
    fn local_peer_id(&self) -> &str;

    /// Deliver `bytes` to every connected subscriber of `topic`.
    async fn publish(&self, topic: Topic, bytes: Vec<u8>) -> Result<()>;

    /// Deliver `bytes` to `peer` on [`Topic::Direct`].
    async fn send(&self, peer: &str, bytes: Vec<u8>) -> Result<()>;

    /// Stream of everything received on `topic`.
    async fn subscribe(&self, topic: Topic) -> Result<mpsc::Receiver<Inbound>>;

    /// Stream of connect and disconnect notifications.
    async fn peer_events(&self) -> Result<mpsc::Receiver<PeerEvent>>;

    /// Peers currently reachable.
    async fn known_peers(&self) -> Vec<PeerId>;
}

// =============================================================================
// In-memory network
// =============================================================================

#[derive(Default)]
struct PeerSlot {
    subscriptions: BTreeMap<Topic, Vec<mpsc::Sender<Inbound>>>,
    events: Vec<mpsc::Sender<PeerEvent>>,
}

#[derive(Default)]
struct NetworkState {
    peers: BTreeMap<PeerId, PeerSlot>,
    /// Unordered pairs with no connectivity.
    severed: BTreeSet<(PeerId, PeerId)>,
}

impl NetworkState {
    fn linked(&self, a: &str, b: &str) -> bool {
        a != b && !self.severed.contains(&link(a, b))
    }

    fn notify(&mut self, to: &str, event: PeerEvent) {
        if let Some(slot) = self.peers.get_mut(to) {
            slot.events.retain(|tx| offer(tx, event.clone(), to));
        }
    }

    fn deliver(&mut self, to: &str, inbound: Inbound) -> bool {
        let Some(slot) = self.peers.get_mut(to) else {
            return false;
        };
        let Some(subscribers) = slot.subscriptions.get_mut(&inbound.topic) else {
            return true;
        };
        subscribers.retain(|tx| offer(tx, inbound.clone(), to));
        true
    }
}

/// Queue `item` without waiting. False once the receiver is gone.
fn offer<T>(tx: &mpsc::Sender<T>, item: T, peer: &str) -> bool {
    match tx.try_send(item) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(%peer, "inbox full, dropping message");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

fn link(a: &str, b: &str) -> (PeerId, PeerId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// A fully connected in-process network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    /// An empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a peer and announce it to everyone already attached.
    pub async fn join(&self, peer_id: impl Into<PeerId>) -> MemoryTransport {
        let peer_id = peer_id.into();
        let mut state = self.state.lock().await;
        state.peers.entry(peer_id.clone()).or_default();
        let others: Vec<PeerId> = state
            .peers
            .keys()
            .filter(|other| state.linked(&peer_id, other))
            .cloned()
            .collect();
        for other in others {
            state.notify(&other, PeerEvent::Connected(peer_id.clone()));
        }
        tracing::debug!(peer = %peer_id, "joined memory network");
        MemoryTransport {
            peer_id,
            network: self.clone(),
        }
    }

    /// Detach a peer; its subscriptions close.
    pub async fn leave(&self, peer_id: &str) {
        let mut state = self.state.lock().await;
        if state.peers.remove(peer_id).is_none() {
            return;
        }
        let others: Vec<PeerId> = state
            .peers
            .keys()
            .filter(|other| state.linked(peer_id, other))
            .cloned()
            .collect();
        for other in others {
            state.notify(&other, PeerEvent::Disconnected(peer_id.to_string()));
        }
    }

    /// Cut the link between `a` and `b` in both directions.
    pub async fn sever(&self, a: &str, b: &str) {
        let mut state = self.state.lock().await;
        if state.severed.insert(link(a, b)) {
            state.notify(a, PeerEvent::Disconnected(b.to_string()));
            state.notify(b, PeerEvent::Disconnected(a.to_string()));
        }
    }

    /// Restore a link cut by [`MemoryNetwork::sever`].
    pub async fn heal(&self, a: &str, b: &str) {
        let mut state = self.state.lock().await;
        if state.severed.remove(&link(a, b)) {
            state.notify(a, PeerEvent::Connected(b.to_string()));
            state.notify(b, PeerEvent::Connected(a.to_string()));
        }
    }
}

/// One peer's handle on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    peer_id: PeerId,
    network: MemoryNetwork,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn publish(&self, topic: Topic, bytes: Vec<u8>) -> Result<()> {
        let mut state = self.network.state.lock().await;
        if !state.peers.contains_key(&self.peer_id) {
            return Err(SyncError::Closed);
        }
        let targets: Vec<PeerId> = state
            .peers
            .keys()
            .filter(|other| state.linked(&self.peer_id, other))
            .cloned()
            .collect();
        for target in targets {
            let inbound = Inbound {
                from: self.peer_id.clone(),
                topic,
                bytes: bytes.clone(),
            };
            state.deliver(&target, inbound);
        }
        Ok(())
    }

    async fn send(&self, peer: &str, bytes: Vec<u8>) -> Result<()> {
        let mut state = self.network.state.lock().await;
        if !state.peers.contains_key(&self.peer_id) {
            return Err(SyncError::Closed);
        }
        if !state.linked(&self.peer_id, peer) {
            return Err(SyncError::Unreachable(peer.to_string()));
        }
        let inbound = Inbound {
            from: self.peer_id.clone(),
            topic: Topic::Direct,
            bytes,
        };
        if state.deliver(peer, inbound) {
            Ok(())
        } else {
            Err(SyncError::Unreachable(peer.to_string()))
        }
    }

    async fn subscribe(&self, topic: Topic) -> Result<mpsc::Receiver<Inbound>> {
        let mut state = self.network.state.lock().await;
        let slot = state.peers.get_mut(&self.peer_id).ok_or(SyncError::Closed)?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        slot.subscriptions.entry(topic).or_default().push(tx);
        Ok(rx)
    }

    async fn peer_events(&self) -> Result<mpsc::Receiver<PeerEvent>> {
        let mut state = self.network.state.lock().await;
        let slot = state.peers.get_mut(&self.peer_id).ok_or(SyncError::Closed)?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        slot.events.push(tx);
        Ok(rx)
    }

    async fn known_peers(&self) -> Vec<PeerId> {
        let state = self.network.state.lock().await;
        state
            .peers
            .keys()
            .filter(|other| state.linked(&self.peer_id, other))
            .cloned()
            .collect()
    }
}
