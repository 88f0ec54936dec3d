//! Outstanding chain requests and their deadlines.

use crate::transport::PeerId;
use hegemon_core::PlayerId;
use std::collections::{BTreeMap, BTreeSet};

/// A chain request waiting for its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Whose chain is wanted
    pub player: PlayerId,
    /// First index asked for
    pub from_index: u64,
    /// Peer currently asked
    pub peer: PeerId,
    /// Every peer asked so far, including `peer`
    pub tried: BTreeSet<PeerId>,
    /// Peers asked, counting retries
    pub attempts: u32,
    /// Expiry time in milliseconds
    pub deadline: u64,
}

/// At most one request in flight per player chain.
#[derive(Debug, Clone)]
pub struct PendingRequests {
    timeout_ms: u64,
    max_attempts: u32,
    requests: BTreeMap<PlayerId, PendingRequest>,
}

impl PendingRequests {
    /// No requests in flight.
    pub fn new(timeout_ms: u64, max_attempts: u32) -> Self {
        Self {
            timeout_ms,
            max_attempts,
            requests: BTreeMap::new(),
        }
    }

    /// The in-flight request for `player`.
    pub fn get(&self, player: &PlayerId) -> Option<&PendingRequest> {
        self.requests.get(player)
    }

    /// Nothing in flight.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Track a new request. Returns `false`, leaving the existing entry
    /// alone, if one is already in flight for `player`.
    pub fn begin(&mut self, player: PlayerId, from_index: u64, peer: PeerId, now: u64) -> bool {
        if self.requests.contains_key(&player) {
            return false;
        }
        let request = PendingRequest {
            player: player.clone(),
            from_index,
            tried: BTreeSet::from([peer.clone()]),
            peer,
            attempts: 1,
            deadline: now.saturating_add(self.timeout_ms),
        };
        self.requests.insert(player, request);
        true
    }

    /// A response for `player` arrived.
    pub fn resolve(&mut self, player: &PlayerId) -> Option<PendingRequest> {
        self.requests.remove(player)
    }

    /// Remove and return every request whose deadline has passed.
    pub fn take_expired(&mut self, now: u64) -> Vec<PendingRequest> {
        let expired: Vec<PlayerId> = self
            .requests
            .iter()
            .filter(|(_, request)| request.deadline <= now)
            .map(|(player, _)| player.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|player| self.requests.remove(&player))
            .collect()
    }

    /// Re-track an expired request against `peer`. Returns `None` once the
    /// attempt budget is spent.
    pub fn retry(
        &mut self,
        mut request: PendingRequest,
        peer: PeerId,
        now: u64,
    ) -> Option<&PendingRequest> {
        if request.attempts >= self.max_attempts {
            return None;
        }
        request.attempts += 1;
        request.tried.insert(peer.clone());
        request.peer = peer;
        request.deadline = now.saturating_add(self.timeout_ms);
        let player = request.player.clone();
        self.requests.insert(player.clone(), request);
        self.requests.get(&player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> PlayerId {
        PlayerId::from_public_key(&[3; 32])
    }

    #[test]
    fn one_request_per_player() {
        let mut pending = PendingRequests::new(1_000, 3);
        assert!(pending.begin(player(), 4, "a".into(), 0));
        assert!(!pending.begin(player(), 6, "b".into(), 0));
        assert_eq!(pending.get(&player()).unwrap().peer, "a");
        assert_eq!(pending.resolve(&player()).unwrap().from_index, 4);
        assert!(pending.is_empty());
    }

    #[test]
    fn expiry_and_bounded_retries() {
        let mut pending = PendingRequests::new(1_000, 2);
        pending.begin(player(), 0, "a".into(), 0);
        assert!(pending.take_expired(999).is_empty());

        let expired = pending.take_expired(1_000);
        assert_eq!(expired.len(), 1);
        assert!(pending.is_empty());

        let retried = pending
            .retry(expired[0].clone(), "b".into(), 1_000)
            .cloned()
            .unwrap();
        assert_eq!(retried.attempts, 2);
        assert_eq!(retried.deadline, 2_000);
        assert_eq!(retried.tried, BTreeSet::from(["a".to_string(), "b".to_string()]));

        let expired = pending.take_expired(2_000);
        assert!(pending.retry(expired[0].clone(), "c".into(), 2_000).is_none());
        assert!(pending.is_empty());
    }
}
