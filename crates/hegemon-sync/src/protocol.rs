//! Action chain reconciliation.
//!
//! [`ChainSync`] decides what to do with chain traffic; it never touches the
//! network itself. Each handler takes the owning [`ChainBook`] by `&mut`,
//! so verification and commit happen in the caller's single critical
//! section, and returns any request the caller should send.
//!
//! A block that does not extend the local head is never dropped silently:
//! the missing range is requested from the peer that sent it, starting at
//! the local length. Blocks that fail their own integrity checks are
//! rejected and the range is requested from some other peer instead.
//!
//! Every remote block passes through a [`BlockSink`] between verification
//! and commit. A block the sink fails to store stays out of the book.

use crate::error::SyncError;
use crate::message::{ChainRequest, ChainResponse, PeerAnnounce};
use crate::peers::{BackoffConfig, PeerBook};
use crate::pending::PendingRequests;
use crate::transport::{PeerEvent, PeerId};
use hegemon_chain::{ActionBlock, ChainBook, ChainError};
use hegemon_core::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tuning for chain reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Time a peer has to answer a chain request, in milliseconds
    pub request_timeout_ms: u64,
    /// Peers tried for one range before giving up
    pub max_request_attempts: u32,
    /// Blocks served per chain response
    pub max_blocks_per_response: usize,
    /// Retry delays for failing peers
    pub backoff: BackoffConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            max_request_attempts: 3,
            max_blocks_per_response: 64,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Durable storage for remote blocks.
pub trait BlockSink {
    /// Store `block`, which has passed fast-path verification but is not
    /// yet part of the book.
    fn persist(&mut self, block: &ActionBlock) -> Result<(), SyncError>;
}

/// Collects persisted blocks in arrival order.
impl BlockSink for Vec<ActionBlock> {
    fn persist(&mut self, block: &ActionBlock) -> Result<(), SyncError> {
        self.push(block.clone());
        Ok(())
    }
}

/// A chain request to send to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Destination
    pub peer: PeerId,
    /// What to ask for
    pub request: ChainRequest,
}

/// What became of a gossiped block.
#[derive(Debug)]
pub enum BlockOutcome {
    /// Verified and committed as the new head.
    Accepted {
        /// Chain owner
        player: PlayerId,
        /// New head index
        index: u64,
    },
    /// Already stored.
    Duplicate,
    /// The block does not extend the local head; `request` fetches the gap
    /// unless one is already in flight.
    Behind {
        /// Gap or linkage error that triggered catch-up
        error: ChainError,
        /// Range request to send, if any
        request: Option<OutboundRequest>,
    },
    /// The block failed its own checks.
    Rejected {
        /// The integrity failure
        error: ChainError,
        /// The same range asked of a different peer
        request: Option<OutboundRequest>,
    },
    /// The block verified but the sink could not store it.
    Unstored {
        /// Why the sink refused it
        error: SyncError,
    },
}

/// Result of applying a chain response.
#[derive(Debug, Default)]
pub struct ResponseOutcome {
    /// Blocks verified, stored and committed
    pub accepted: usize,
    /// Blocks already stored
    pub skipped: usize,
    /// First block that failed; nothing after it was applied
    pub failed: Option<ChainError>,
    /// Storage failure that stopped the response early
    pub unstored: Option<SyncError>,
    /// Next page, when the response was full
    pub follow_up: Option<OutboundRequest>,
}

/// Chain reconciliation state for one local player.
pub struct ChainSync {
    local: PlayerId,
    config: SyncConfig,
    peers: PeerBook,
    pending: PendingRequests,
}

impl ChainSync {
    /// Fresh state with no known peers or requests.
    pub fn new(local: PlayerId, config: SyncConfig) -> Self {
        Self {
            peers: PeerBook::new(config.backoff.clone()),
            pending: PendingRequests::new(config.request_timeout_ms, config.max_request_attempts),
            local,
            config,
        }
    }

    /// Active tuning.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Known peers and their health.
    pub fn peers(&self) -> &PeerBook {
        &self.peers
    }

    /// Chain requests awaiting a response.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Track transport connectivity.
    pub fn on_peer_event(&mut self, event: &PeerEvent, now: u64) {
        match event {
            PeerEvent::Connected(peer) => {
                tracing::debug!(%peer, "peer connected");
                self.peers.connected(peer, now);
            }
            PeerEvent::Disconnected(peer) => {
                tracing::debug!(%peer, "peer disconnected");
                self.peers.disconnected(peer);
            }
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Handle a block gossiped by `from`.
    pub fn on_command_block(
        &mut self,
        book: &mut ChainBook,
        sink: &mut impl BlockSink,
        from: &str,
        block: ActionBlock,
        now: u64,
    ) -> BlockOutcome {
        let player = block.player_id.clone();
        let index = block.index;
        match admit(book, sink, block) {
            Admission::Committed => {
                self.peers.record_success(from, now);
                BlockOutcome::Accepted { player, index }
            }
            Admission::Known => BlockOutcome::Duplicate,
            Admission::Unstored(error) => {
                tracing::error!(%player, index, %error, "failed to store remote block");
                BlockOutcome::Unstored { error }
            }
            Admission::Invalid(error) if error.needs_catch_up() => {
                tracing::debug!(%player, index, %from, %error, "block ahead of local head");
                let from_index = book.len(&player);
                let request = self.request_from(player, from_index, from.to_string(), now);
                BlockOutcome::Behind { error, request }
            }
            Admission::Invalid(error) => {
                tracing::warn!(%player, index, %from, %error, "rejected block");
                let request = if error.is_integrity() {
                    self.peers.record_failure(from, now);
                    let from_index = book.len(&player);
                    let excluding = BTreeSet::from([from.to_string()]);
                    self.peers
                        .select_peer(&excluding, now)
                        .and_then(|peer| self.request_from(player, from_index, peer, now))
                } else {
                    None
                };
                BlockOutcome::Rejected { error, request }
            }
        }
    }

    /// Serve the requested range. Suspect chains are served like any other;
    /// the requester runs its own checks.
    pub fn on_chain_request(&self, book: &ChainBook, request: &ChainRequest) -> ChainResponse {
        let blocks = book.blocks_from(
            &request.player_id,
            request.from_index,
            self.config.max_blocks_per_response,
        );
        tracing::debug!(
            player = %request.player_id,
            from_index = request.from_index,
            requester = %request.requester_id,
            served = blocks.len(),
            "serving chain request"
        );
        ChainResponse {
            player_id: request.player_id.clone(),
            blocks,
        }
    }

    /// Apply a response in order, stopping at the first block that fails
    /// fast-path acceptance or cannot be stored.
    ///
    /// Only a response from the peer the range was requested from settles
    /// the pending request. Blocks in any other response are still applied.
    pub fn on_chain_response(
        &mut self,
        book: &mut ChainBook,
        sink: &mut impl BlockSink,
        from: &str,
        response: ChainResponse,
        now: u64,
    ) -> ResponseOutcome {
        let requested = self
            .pending
            .get(&response.player_id)
            .is_some_and(|pending| pending.peer == from);
        if requested {
            self.pending.resolve(&response.player_id);
        } else {
            tracing::debug!(player = %response.player_id, %from, "unrequested chain response");
        }
        let full = response.blocks.len() >= self.config.max_blocks_per_response;
        let mut outcome = ResponseOutcome::default();

        for block in response.blocks {
            if block.player_id != response.player_id {
                outcome.failed = Some(ChainError::SignerMismatch {
                    player: response.player_id.clone(),
                    index: block.index,
                });
                break;
            }
            match admit(book, sink, block) {
                Admission::Committed => outcome.accepted += 1,
                Admission::Known => outcome.skipped += 1,
                Admission::Invalid(error) => {
                    outcome.failed = Some(error);
                    break;
                }
                Admission::Unstored(error) => {
                    tracing::error!(player = %response.player_id, %error, "failed to store remote block");
                    outcome.unstored = Some(error);
                    break;
                }
            }
        }

        match &outcome.failed {
            None if outcome.unstored.is_some() => {}
            None => {
                self.peers.record_success(from, now);
                if full {
                    let from_index = book.len(&response.player_id);
                    outcome.follow_up =
                        self.request_from(response.player_id.clone(), from_index, from.to_string(), now);
                }
            }
            Some(error) => {
                tracing::warn!(
                    player = %response.player_id,
                    %from,
                    accepted = outcome.accepted,
                    %error,
                    "chain response stopped at invalid block"
                );
                if error.is_integrity() {
                    self.peers.record_failure(from, now);
                }
            }
        }
        tracing::debug!(
            player = %response.player_id,
            accepted = outcome.accepted,
            skipped = outcome.skipped,
            "applied chain response"
        );
        outcome
    }

    /// Remember the announcement and ask for blocks if the peer claims a
    /// longer chain than we hold.
    pub fn on_peer_announce(
        &mut self,
        book: &ChainBook,
        from: &str,
        announce: PeerAnnounce,
        now: u64,
    ) -> Option<OutboundRequest> {
        let player = announce.player_id.clone();
        let claimed = announce.chain_length;
        self.peers.note_announce(from, announce, now);
        if player == self.local {
            return None;
        }
        let held = book.len(&player);
        if claimed <= held {
            return None;
        }
        tracing::debug!(%player, %from, held, claimed, "peer announced a longer chain");
        self.request_from(player, held, from.to_string(), now)
    }

    /// Retry requests whose deadline passed against a peer not yet tried.
    pub fn on_tick(&mut self, book: &ChainBook, now: u64) -> Vec<OutboundRequest> {
        let mut retries = Vec::new();
        for expired in self.pending.take_expired(now) {
            let timeout = SyncError::Timeout {
                peer: expired.peer.clone(),
                player: expired.player.clone(),
            };
            tracing::warn!(error = %timeout, attempts = expired.attempts, "chain request expired");
            self.peers.record_failure(&expired.peer, now);

            let Some(peer) = self.peers.select_peer(&expired.tried, now) else {
                tracing::warn!(player = %expired.player, "no peer left to ask for chain");
                continue;
            };
            let from_index = book.len(&expired.player);
            let player = expired.player.clone();
            match self.pending.retry(expired, peer, now) {
                Some(pending) => retries.push(OutboundRequest {
                    peer: pending.peer.clone(),
                    request: ChainRequest {
                        player_id: player,
                        from_index,
                        requester_id: self.local.clone(),
                    },
                }),
                None => tracing::warn!(%player, "giving up on chain request"),
            }
        }
        retries
    }

    fn request_from(
        &mut self,
        player: PlayerId,
        from_index: u64,
        peer: PeerId,
        now: u64,
    ) -> Option<OutboundRequest> {
        if !self.pending.begin(player.clone(), from_index, peer.clone(), now) {
            return None;
        }
        Some(OutboundRequest {
            peer,
            request: ChainRequest {
                player_id: player,
                from_index,
                requester_id: self.local.clone(),
            },
        })
    }
}

enum Admission {
    Committed,
    Known,
    Invalid(ChainError),
    Unstored(SyncError),
}

/// Verify, store, then commit. The book only changes once the sink has the
/// block.
fn admit(book: &mut ChainBook, sink: &mut impl BlockSink, block: ActionBlock) -> Admission {
    let verified = match book.verify_remote(block) {
        Ok(verified) => verified,
        Err(ChainError::AlreadyKnown { .. }) => return Admission::Known,
        Err(error) => return Admission::Invalid(error),
    };
    if let Err(error) = sink.persist(verified.block()) {
        return Admission::Unstored(error);
    }
    match book.commit(verified) {
        Ok(()) => Admission::Committed,
        Err(error) => Admission::Invalid(error),
    }
}
