//! Cloneable mailbox onto a running node.

use crate::error::{NodeError, Result};
use hegemon_chain::{ActionBlock, ActionCommand, ReplayReport};
use hegemon_core::{Address, PlayerId};
use hegemon_ledger::SignedTx;
use hegemon_world::{CombatLogEntry, RankingData, WorldView};
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Request {
    SubmitTransaction {
        tx: SignedTx,
        reply: Reply<()>,
    },
    Transfer {
        to: Address,
        amount: u64,
        fee: u64,
        reply: Reply<SignedTx>,
    },
    MintReward {
        amount: u64,
        reason: String,
        reply: Reply<()>,
    },
    AppendCommand {
        command: ActionCommand,
        reply: Reply<ActionBlock>,
    },
    RecordCombat {
        entry: CombatLogEntry,
        reply: Reply<CombatLogEntry>,
    },
    PublishRanking {
        ranking: RankingData,
        reply: Reply<RankingData>,
    },
    ClaimZone {
        zone_id: String,
        reply: Reply<()>,
    },
    DiscoverZone {
        zone_id: String,
        reply: Reply<()>,
    },
    VerifyPlayer {
        player: PlayerId,
        reply: Reply<ReplayReport>,
    },
    Balance {
        address: Address,
        reply: Reply<u64>,
    },
    ChainLen {
        player: PlayerId,
        reply: Reply<u64>,
    },
    WorldView {
        reply: Reply<WorldView>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle for talking to the node actor. Every call is answered in the
/// order it was queued.
#[derive(Clone)]
pub struct NodeHandle {
    requests: mpsc::Sender<Request>,
    player: PlayerId,
}

impl NodeHandle {
    pub(crate) fn new(requests: mpsc::Sender<Request>, player: PlayerId) -> Self {
        Self { requests, player }
    }

    /// The local player's address.
    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| NodeError::Stopped)?;
        response.await.map_err(|_| NodeError::Stopped)?
    }

    /// Validate, journal, apply and gossip a signed transaction.
    pub async fn submit_transaction(&self, tx: SignedTx) -> Result<()> {
        self.call(|reply| Request::SubmitTransaction { tx, reply }).await
    }

    /// Sign a transfer from the local wallet and submit it.
    pub async fn transfer(&self, to: Address, amount: u64, fee: u64) -> Result<SignedTx> {
        self.call(|reply| Request::Transfer {
            to,
            amount,
            fee,
            reply,
        })
        .await
    }

    /// Issue `amount` new tokens to the local player.
    pub async fn mint_reward(&self, amount: u64, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.call(|reply| Request::MintReward {
            amount,
            reason,
            reply,
        })
        .await
    }

    /// Apply `command` to the local simulation state and append the result
    /// to the local chain.
    pub async fn append_command(&self, command: ActionCommand) -> Result<ActionBlock> {
        self.call(|reply| Request::AppendCommand { command, reply }).await
    }

    /// Sign and record a combat outcome in the shared world.
    pub async fn record_combat(&self, entry: CombatLogEntry) -> Result<CombatLogEntry> {
        self.call(|reply| Request::RecordCombat { entry, reply }).await
    }

    /// Sign and publish the local player's ranking.
    pub async fn publish_ranking(&self, ranking: RankingData) -> Result<RankingData> {
        self.call(|reply| Request::PublishRanking { ranking, reply }).await
    }

    /// Claim a shared-world zone for the local player.
    pub async fn claim_zone(&self, zone_id: impl Into<String>) -> Result<()> {
        let zone_id = zone_id.into();
        self.call(|reply| Request::ClaimZone { zone_id, reply }).await
    }

    /// Mark a zone as discovered by the local player.
    pub async fn discover_zone(&self, zone_id: impl Into<String>) -> Result<()> {
        let zone_id = zone_id.into();
        self.call(|reply| Request::DiscoverZone { zone_id, reply }).await
    }

    /// Replay `player`'s chain and flag it suspect if a state hash differs.
    pub async fn verify_player(&self, player: PlayerId) -> Result<ReplayReport> {
        self.call(|reply| Request::VerifyPlayer { player, reply }).await
    }

    /// Ledger balance of `address`.
    pub async fn balance(&self, address: Address) -> Result<u64> {
        self.call(|reply| Request::Balance { address, reply }).await
    }

    /// Number of blocks stored for `player`.
    pub async fn chain_len(&self, player: PlayerId) -> Result<u64> {
        self.call(|reply| Request::ChainLen { player, reply }).await
    }

    /// Snapshot of the shared world.
    pub async fn world_view(&self) -> Result<WorldView> {
        self.call(|reply| Request::WorldView { reply }).await
    }

    /// Stop the node and wait until its state is flushed.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.requests
            .send(Request::Shutdown { reply })
            .await
            .map_err(|_| NodeError::Stopped)?;
        done.await.map_err(|_| NodeError::Stopped)
    }
}
