//! The node database.

use crate::error::{Result, StoreError};
use crate::records::{PeerRecord, PlayerSnapshot};
use crate::schema::{
    self, ACTION_BLOCKS, CHAIN_INDEX, KNOWN_PEERS, LEDGER_JOURNAL, PLAYER_SNAPSHOTS, SCHEMA_VERSION_KEY,
    METADATA, WORLD_SNAPSHOT, WORLD_SNAPSHOT_KEY,
};
use hegemon_chain::ActionBlock;
use hegemon_core::{Address, PlayerId};
use hegemon_ledger::LedgerEntry;
use redb::{Database, ReadableTable};
use std::collections::BTreeSet;
use std::path::Path;

/// Embedded transactional store.
///
/// Every write commits before returning. Readers see the last committed
/// state and never block the writer.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open or create the database at `path` and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(&path)?;
        let version = schema::migrate(&db)?;
        tracing::debug!(path = %path.display(), version, "store opened");
        Ok(Self { db })
    }

    /// Schema version recorded by the last migration that ran.
    pub fn schema_version(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METADATA)?;
        let version = table.get(SCHEMA_VERSION_KEY)?.map(|v| v.value());
        Ok(version.unwrap_or(0))
    }

    // Player snapshots

    /// Store a player snapshot keyed by player and tick.
    pub fn put_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<()> {
        let body = serde_json::to_string(snapshot)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PLAYER_SNAPSHOTS)?;
            table.insert((snapshot.player_id.as_str(), snapshot.tick), body.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Snapshot of `player` with the highest tick.
    pub fn latest_snapshot(&self, player: &PlayerId) -> Result<Option<PlayerSnapshot>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PLAYER_SNAPSHOTS)?;
        let mut range = table.range((player.as_str(), 0u64)..=(player.as_str(), u64::MAX))?;
        match range.next_back() {
            Some(entry) => {
                let (_, body) = entry?;
                Ok(Some(serde_json::from_str(body.value())?))
            }
            None => Ok(None),
        }
    }

    // Action chains

    /// Persist `block` under its hash and index it by (player, index).
    ///
    /// Storing the same block twice is a no-op; a different block at an
    /// occupied index is refused.
    pub fn append_block(&self, block: &ActionBlock) -> Result<()> {
        let body = serde_json::to_string(block)?;
        let key = (block.player_id.as_str(), block.index);
        let txn = self.db.begin_write()?;
        {
            let mut index = txn.open_table(CHAIN_INDEX)?;
            let stored = index.get(key)?.map(|hash| hash.value().to_string());
            match stored {
                Some(stored) if stored == block.hash => {
                    drop(index);
                    txn.abort()?;
                    return Ok(());
                }
                Some(stored) => {
                    return Err(StoreError::BlockConflict {
                        player: block.player_id.clone(),
                        index: block.index,
                        stored,
                    });
                }
                None => {}
            }
            index.insert(key, block.hash.as_str())?;
            txn.open_table(ACTION_BLOCKS)?
                .insert(block.hash.as_str(), body.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Every stored block of `player` in index order.
    pub fn load_chain(&self, player: &PlayerId) -> Result<Vec<ActionBlock>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(CHAIN_INDEX)?;
        let blocks = txn.open_table(ACTION_BLOCKS)?;

        let mut chain = Vec::new();
        for entry in index.range((player.as_str(), 0u64)..=(player.as_str(), u64::MAX))? {
            let (_, hash) = entry?;
            let hash = hash.value();
            let body = blocks
                .get(hash)?
                .ok_or_else(|| StoreError::MissingBlock(hash.to_string()))?;
            chain.push(serde_json::from_str(body.value())?);
        }
        Ok(chain)
    }

    /// Players with at least one stored block.
    pub fn chain_players(&self) -> Result<BTreeSet<PlayerId>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(CHAIN_INDEX)?;
        let mut players = BTreeSet::new();
        for entry in index.iter()? {
            let (key, _) = entry?;
            let (player, _) = key.value();
            players.insert(PlayerId::new_unchecked(player));
        }
        Ok(players)
    }

    // Known peers

    /// Insert or replace the record for `peer.address`.
    pub fn upsert_peer(&self, peer: &PeerRecord) -> Result<()> {
        let body = serde_json::to_string(peer)?;
        let txn = self.db.begin_write()?;
        txn.open_table(KNOWN_PEERS)?
            .insert(peer.address.as_str(), body.as_str())?;
        txn.commit()?;
        Ok(())
    }

    /// Every remembered peer, ordered by address.
    pub fn known_peers(&self) -> Result<Vec<PeerRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(KNOWN_PEERS)?;
        let mut peers = Vec::new();
        for entry in table.iter()? {
            let (_, body) = entry?;
            peers.push(serde_json::from_str(body.value())?);
        }
        Ok(peers)
    }

    /// Bump the success count and last-seen time of a known peer. Returns
    /// `false` if the peer is unknown.
    pub fn record_peer_success(&self, address: &Address, seen_at: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut table = txn.open_table(KNOWN_PEERS)?;
            let current = table
                .get(address.as_str())?
                .map(|body| body.value().to_string());
            match current {
                Some(body) => {
                    let mut peer: PeerRecord = serde_json::from_str(&body)?;
                    peer.success_count += 1;
                    peer.last_seen = peer.last_seen.max(seen_at);
                    let body = serde_json::to_string(&peer)?;
                    table.insert(address.as_str(), body.as_str())?;
                    true
                }
                None => false,
            }
        };
        txn.commit()?;
        Ok(updated)
    }

    // Ledger journal

    /// Append a journal entry, returning its sequence number.
    pub fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<u64> {
        let body = serde_json::to_string(entry)?;
        let txn = self.db.begin_write()?;
        let seq = {
            let mut table = txn.open_table(LEDGER_JOURNAL)?;
            let next = match table.last()? {
                Some((seq, _)) => seq.value() + 1,
                None => 0,
            };
            table.insert(next, body.as_str())?;
            next
        };
        txn.commit()?;
        Ok(seq)
    }

    /// The whole journal in application order.
    pub fn ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(LEDGER_JOURNAL)?;
        let mut entries = Vec::new();
        for entry in table.iter()? {
            let (_, body) = entry?;
            entries.push(serde_json::from_str(body.value())?);
        }
        Ok(entries)
    }

    // World snapshot

    /// Replace the saved shared-world document.
    pub fn save_world(&self, snapshot: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.open_table(WORLD_SNAPSHOT)?
            .insert(WORLD_SNAPSHOT_KEY, snapshot)?;
        txn.commit()?;
        Ok(())
    }

    /// The last saved shared-world document, if any.
    pub fn load_world(&self) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(WORLD_SNAPSHOT)?;
        let found = table.get(WORLD_SNAPSHOT_KEY)?;
        Ok(found.map(|bytes| bytes.value().to_vec()))
    }
}
