//! Owned collection of every known action chain.

use crate::block::ActionBlock;
use crate::command::ActionCommand;
use crate::error::{ChainError, Result};
use crate::replay::ReplayReport;
use hegemon_core::{PlayerId, GENESIS_PREV_HASH};
use hegemon_wallet::Wallet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A block that passed every fast-path check against the book it was
/// verified with. Only [`ChainBook::commit`] consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBlock(ActionBlock);

impl VerifiedBlock {
    /// The verified block.
    pub fn block(&self) -> &ActionBlock {
        &self.0
    }

    /// Unwrap without committing.
    pub fn into_inner(self) -> ActionBlock {
        self.0
    }
}

/// Why a player's chain is considered suspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspectRecord {
    /// Replay result that failed
    pub report: ReplayReport,
    /// When the chain was flagged, in milliseconds
    pub flagged_at: u64,
}

/// Per-player linear logs, local and remote alike.
///
/// Suspect chains stay stored and servable; flagging is for detection only.
#[derive(Debug, Default, Clone)]
pub struct ChainBook {
    chains: BTreeMap<PlayerId, Vec<ActionBlock>>,
    suspects: BTreeMap<PlayerId, SuspectRecord>,
}

impl ChainBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last stored block of `player`.
    pub fn head(&self, player: &PlayerId) -> Option<&ActionBlock> {
        self.chains.get(player).and_then(|chain| chain.last())
    }

    /// Number of stored blocks of `player`, which is also the next index.
    pub fn len(&self, player: &PlayerId) -> u64 {
        self.chains.get(player).map_or(0, |chain| chain.len() as u64)
    }

    /// Every player with at least one stored block.
    pub fn players(&self) -> impl Iterator<Item = &PlayerId> {
        self.chains.keys()
    }

    /// All stored blocks of `player`, genesis first.
    pub fn chain(&self, player: &PlayerId) -> &[ActionBlock] {
        self.chains.get(player).map_or(&[], Vec::as_slice)
    }

    /// Up to `limit` blocks of `player` starting at index `from`.
    pub fn blocks_from(&self, player: &PlayerId, from: u64, limit: usize) -> Vec<ActionBlock> {
        let chain = self.chain(player);
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(chain.len());
        chain[start..].iter().take(limit).cloned().collect()
    }

    /// Build and sign the next block of the wallet's own chain.
    ///
    /// The first block of an empty chain must carry a genesis command.
    pub fn prepare_local(
        &self,
        wallet: &Wallet,
        command: ActionCommand,
        state_hash: impl Into<String>,
        timestamp: u64,
    ) -> Result<VerifiedBlock> {
        let block = ActionBlock::seal(wallet, self.head(wallet.address()), command, state_hash, timestamp)?;
        block.check_integrity()?;
        Ok(VerifiedBlock(block))
    }

    /// Append a command to the wallet's own chain, stamped with the current
    /// time. Returns the stored block, ready to broadcast.
    pub fn append_local(
        &mut self,
        wallet: &Wallet,
        command: ActionCommand,
        state_hash: impl Into<String>,
    ) -> Result<ActionBlock> {
        let verified = self.prepare_local(wallet, command, state_hash, hegemon_core::now_millis())?;
        let block = verified.block().clone();
        self.commit(verified)?;
        tracing::debug!(player = %block.player_id, index = block.index, "appended local block");
        Ok(block)
    }

    /// Fast-path checks for a block received from a peer.
    ///
    /// Linkage against the local head is checked first so that a gap or a
    /// mismatched `prevHash` surfaces as a catch-up condition. The block's
    /// own hash, signer binding and signature follow.
    pub fn verify_remote(&self, block: ActionBlock) -> Result<VerifiedBlock> {
        let player = &block.player_id;
        let chain = self.chain(player);
        let expected_index = chain.len() as u64;

        if block.index < expected_index {
            let stored = usize::try_from(block.index)
                .ok()
                .and_then(|i| chain.get(i));
            return match stored {
                Some(stored) if stored.hash == block.hash => Err(ChainError::AlreadyKnown {
                    player: player.clone(),
                    index: block.index,
                }),
                _ => Err(ChainError::Conflict {
                    player: player.clone(),
                    index: block.index,
                }),
            };
        }
        if block.index > expected_index {
            return Err(ChainError::Gap {
                player: player.clone(),
                expected_index,
                got: block.index,
            });
        }

        let expected_prev = chain.last().map_or(GENESIS_PREV_HASH, |head| head.hash.as_str());
        if block.prev_hash != expected_prev {
            return Err(ChainError::PrevHashMismatch {
                player: player.clone(),
                index: block.index,
                expected: expected_prev.to_string(),
                got: block.prev_hash.clone(),
            });
        }

        block.check_integrity()?;
        Ok(VerifiedBlock(block))
    }

    /// Store a verified block as the new head of its chain.
    ///
    /// Fails with [`ChainError::StaleHead`] if the chain moved since the
    /// block was verified; nothing is written in that case.
    pub fn commit(&mut self, verified: VerifiedBlock) -> Result<()> {
        let block = verified.into_inner();
        let chain = self.chains.entry(block.player_id.clone()).or_default();
        let expected_prev = chain.last().map_or(GENESIS_PREV_HASH, |head| head.hash.as_str());
        if block.index != chain.len() as u64 || block.prev_hash != expected_prev {
            return Err(ChainError::StaleHead {
                player: block.player_id,
                index: block.index,
            });
        }
        chain.push(block);
        Ok(())
    }

    /// Verify and commit a remote block in one step.
    pub fn accept_remote(&mut self, block: ActionBlock) -> Result<()> {
        let verified = self.verify_remote(block)?;
        let (player, index) = (verified.block().player_id.clone(), verified.block().index);
        self.commit(verified)?;
        tracing::debug!(%player, index, "accepted remote block");
        Ok(())
    }

    /// Rebuild a chain from persisted blocks, verifying each in order.
    ///
    /// Any block already present is skipped; the first invalid block stops
    /// the load and is returned as the error.
    pub fn load_chain(&mut self, blocks: impl IntoIterator<Item = ActionBlock>) -> Result<usize> {
        let mut loaded = 0;
        for block in blocks {
            match self.accept_remote(block) {
                Ok(()) => loaded += 1,
                Err(ChainError::AlreadyKnown { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(loaded)
    }

    /// Record a failed deep verification for `player`.
    pub fn flag_suspect(&mut self, player: PlayerId, report: ReplayReport, flagged_at: u64) {
        tracing::warn!(
            %player,
            failed_at_index = ?report.failed_at_index,
            computed = ?report.computed_state_hash,
            claimed = ?report.claimed_state_hash,
            "chain flagged as suspect"
        );
        self.suspects.insert(player, SuspectRecord { report, flagged_at });
    }

    /// Forget a suspect flag, returning it if one was set.
    pub fn clear_suspect(&mut self, player: &PlayerId) -> Option<SuspectRecord> {
        self.suspects.remove(player)
    }

    /// Whether a failed replay has flagged `player`.
    pub fn is_suspect(&self, player: &PlayerId) -> bool {
        self.suspects.contains_key(player)
    }
}
