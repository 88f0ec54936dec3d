//! Known peers, their health and what they last announced.
//!
//! Announcements are advisory: they decide when to ask a peer for blocks,
//! never what a chain contains.

use crate::message::PeerAnnounce;
use crate::transport::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// Configuration
// =============================================================================

/// Exponential backoff applied to peers that fail requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Consecutive failures after which a peer is no longer selected
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
    /// Whether a success clears the failure streak
    pub reset_on_success: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            reset_on_success: true,
        }
    }
}

impl BackoffConfig {
    /// Delay before a peer with `failures` consecutive failures is retried.
    pub fn delay_for(&self, failures: u32) -> u64 {
        if failures == 0 {
            return 0;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        if delay.is_finite() {
            (delay as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        }
    }
}

// =============================================================================
// Peer status and metadata
// =============================================================================

/// Connection state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    /// Reachable over the transport
    Connected,
    /// Lost, may come back
    Disconnected,
}

/// Everything the node knows about one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMetadata {
    /// Transport identifier
    pub peer_id: PeerId,
    /// Current connection state
    pub status: PeerStatus,
    /// Last announcement received from this peer
    pub announce: Option<PeerAnnounce>,
    /// When the peer was first seen, in milliseconds
    pub first_seen: u64,
    /// When the peer last did anything useful, in milliseconds
    pub last_seen: u64,
    /// Useful responses received
    pub successes: u64,
    /// Timeouts and bad responses
    pub failures: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Not selected before this time
    pub retry_at: u64,
}

impl PeerMetadata {
    /// A peer first seen at `now`, assumed connected.
    pub fn new(peer_id: PeerId, now: u64) -> Self {
        Self {
            peer_id,
            status: PeerStatus::Connected,
            announce: None,
            first_seen: now,
            last_seen: now,
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            retry_at: 0,
        }
    }

    /// Connected, out of backoff and not given up on.
    pub fn is_available(&self, now: u64, config: &BackoffConfig) -> bool {
        self.status == PeerStatus::Connected
            && now >= self.retry_at
            && self.consecutive_failures < config.max_attempts
    }

    /// Selection priority; higher is better.
    pub fn score(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.5
        } else {
            self.successes as f64 / total as f64
        }
    }
}

// =============================================================================
// Peer book
// =============================================================================

/// Health of every peer seen, keyed by transport id.
#[derive(Debug, Clone, Default)]
pub struct PeerBook {
    config: BackoffConfig,
    peers: BTreeMap<PeerId, PeerMetadata>,
}

impl PeerBook {
    /// Empty book.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            peers: BTreeMap::new(),
        }
    }

    /// Backoff in effect.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Metadata for `peer`, if it was ever seen.
    pub fn get(&self, peer: &str) -> Option<&PeerMetadata> {
        self.peers.get(peer)
    }

    fn entry(&mut self, peer: &str, now: u64) -> &mut PeerMetadata {
        self.peers
            .entry(peer.to_string())
            .or_insert_with(|| PeerMetadata::new(peer.to_string(), now))
    }

    /// A connection came up. Reconnecting clears any failure streak.
    pub fn connected(&mut self, peer: &str, now: u64) {
        let meta = self.entry(peer, now);
        meta.status = PeerStatus::Connected;
        meta.last_seen = now;
        meta.consecutive_failures = 0;
        meta.retry_at = 0;
    }

    /// The connection dropped; history is kept for a reconnect.
    pub fn disconnected(&mut self, peer: &str) {
        if let Some(meta) = self.peers.get_mut(peer) {
            meta.status = PeerStatus::Disconnected;
        }
    }

    /// A useful response arrived from `peer`.
    pub fn record_success(&mut self, peer: &str, now: u64) {
        let reset = self.config.reset_on_success;
        let meta = self.entry(peer, now);
        meta.successes += 1;
        meta.last_seen = now;
        if reset {
            meta.consecutive_failures = 0;
            meta.retry_at = 0;
        }
    }

    /// Count a failed request and push the peer's next retry out. Returns
    /// the time the peer becomes selectable again.
    pub fn record_failure(&mut self, peer: &str, now: u64) -> u64 {
        let config = self.config.clone();
        let meta = self.entry(peer, now);
        meta.failures += 1;
        meta.consecutive_failures = meta.consecutive_failures.saturating_add(1);
        meta.retry_at = now.saturating_add(config.delay_for(meta.consecutive_failures));
        if meta.consecutive_failures >= config.max_attempts {
            tracing::warn!(
                peer = %meta.peer_id,
                failures = meta.consecutive_failures,
                "peer exhausted its retries"
            );
        }
        meta.retry_at
    }

    /// Best available peer not in `excluding`: highest score, then most
    /// recently seen.
    pub fn select_peer(&self, excluding: &BTreeSet<PeerId>, now: u64) -> Option<PeerId> {
        self.peers
            .values()
            .filter(|meta| !excluding.contains(&meta.peer_id))
            .filter(|meta| meta.is_available(now, &self.config))
            .max_by(|a, b| {
                a.score()
                    .total_cmp(&b.score())
                    .then(a.last_seen.cmp(&b.last_seen))
            })
            .map(|meta| meta.peer_id.clone())
    }

    /// Remember what `peer` announced about itself.
    pub fn note_announce(&mut self, peer: &str, announce: PeerAnnounce, now: u64) {
        let meta = self.entry(peer, now);
        meta.last_seen = now;
        meta.announce = Some(announce);
    }
}
