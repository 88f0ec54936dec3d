//! The node actor.
//!
//! One task owns the wallet, ledger, chains, shared world and store. Local
//! requests and peer traffic are handled one at a time, so every
//! validate-then-apply sequence runs without interleaving and no locks are
//! needed around the state.

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::handle::{NodeHandle, Request};
use hegemon_chain::{
    verify_chain, ActionBlock, ActionCommand, ChainBook, ChainError, CommandKind, ReplayReport,
    ReplayRules,
};
use hegemon_core::{now_millis, Address, PlayerId};
use hegemon_ledger::{Ledger, LedgerEntry, Reward, SignedTx};
use hegemon_store::{PeerRecord, PlayerSnapshot, Store, StoreError};
use hegemon_sync::{
    BlockOutcome, BlockSink, ChainSync, CombatBroadcast, CommandBlock, Envelope, Inbound, Message,
    OutboundRequest, PeerAnnounce, PeerEvent, RewardBroadcast, StateBroadcast, SyncError, Topic,
    TransactionBroadcast, Transport,
};
use hegemon_wallet::{Wallet, WalletVault};
use hegemon_world::{
    encode_heads, ChangeHash, CombatLogEntry, RankingData, SharedWorld, SignedRecord,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

const MAILBOX_CAPACITY: usize = 64;
const INBOX_CAPACITY: usize = 1024;

/// State owned by the node task. Reached only through [`NodeHandle`].
pub struct Node<T, R: ReplayRules> {
    config: NodeConfig,
    wallet: Wallet,
    player: PlayerId,
    ledger: Ledger,
    chains: ChainBook,
    world: SharedWorld,
    /// Heads as of the last world delta this node published
    published_heads: Vec<ChangeHash>,
    world_dirty: bool,
    store: Store,
    sync: ChainSync,
    transport: T,
    rules: R,
    /// Local simulation state after the head of the local chain
    state: Option<R::State>,
}

impl<T, R> Node<T, R>
where
    T: Transport + 'static,
    R: ReplayRules + Send + 'static,
    R::State: Serialize + Send + 'static,
{
    /// Load or create local state, subscribe to the network and spawn the
    /// actor.
    ///
    /// A missing wallet file is created; an unreadable one aborts startup.
    /// A node whose own chain is empty seals a genesis block from the
    /// configured seed and name.
    pub async fn start(config: NodeConfig, transport: T, rules: R) -> Result<NodeHandle> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let vault = match &config.wallet_identity {
            Some(identity) => WalletVault::with_identity(identity.clone()),
            None => WalletVault::for_host(),
        };
        let wallet = vault.load_or_create(&config.wallet_path())?;
        let player = wallet.address().clone();
        tracing::info!(%player, name = %config.player_name, "starting node");

        let store = Store::open(config.database_path())?;
        let journal = store.ledger_entries()?;
        let ledger = Ledger::replay(&journal)?;

        let mut chains = ChainBook::new();
        for owner in store.chain_players()? {
            let blocks = store.load_chain(&owner)?;
            if let Err(error) = chains.load_chain(blocks) {
                tracing::warn!(
                    player = %owner,
                    loaded = chains.len(&owner),
                    %error,
                    "stored chain stops at an invalid block"
                );
            }
        }

        let mut world = match store.load_world()? {
            Some(snapshot) => SharedWorld::load(&snapshot)?,
            None => SharedWorld::new()?,
        };
        let published_heads = world.heads();

        let state = match chains.chain(&player) {
            [] => None,
            blocks => Some(rebuild_state(&rules, blocks)?),
        };
        if let (Some(state), Some(snapshot)) = (&state, store.latest_snapshot(&player)?) {
            let rebuilt = rules.state_hash(state);
            if rebuilt != snapshot.state_hash {
                tracing::warn!(
                    tick = snapshot.tick,
                    stored = %snapshot.state_hash,
                    %rebuilt,
                    "replayed state differs from the last snapshot"
                );
            }
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOX_CAPACITY);
        for topic in Topic::GOSSIP.into_iter().chain([Topic::Direct]) {
            let mut receiver = transport.subscribe(topic).await?;
            let forward = inbound_tx.clone();
            tokio::spawn(async move {
                while let Some(inbound) = receiver.recv().await {
                    if forward.send(inbound).await.is_err() {
                        break;
                    }
                }
            });
        }
        let events = transport.peer_events().await?;

        let mut sync = ChainSync::new(player.clone(), config.sync.to_sync_config());
        let now = now_millis();
        let mut initial_peers = transport.known_peers().await;
        initial_peers.extend(config.bootstrap_peers.iter().cloned());
        initial_peers.extend(store.known_peers()?.into_iter().map(|peer| peer.peer_id));
        initial_peers.sort();
        initial_peers.dedup();
        for peer in initial_peers {
            sync.on_peer_event(&PeerEvent::Connected(peer), now);
        }

        let mut node = Self {
            config,
            wallet,
            player: player.clone(),
            ledger,
            chains,
            world,
            published_heads,
            world_dirty: false,
            store,
            sync,
            transport,
            rules,
            state,
        };
        if node.state.is_none() {
            node.seal_genesis()?;
        }
        tracing::info!(
            chain_length = node.chains.len(&node.player),
            chains = node.chains.players().count(),
            supply = %node.ledger.total_supply(),
            "node state loaded"
        );

        let (requests, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        tokio::spawn(node.run(mailbox, inbound_rx, events));
        Ok(NodeHandle::new(requests, player))
    }

    fn seal_genesis(&mut self) -> Result<()> {
        let genesis = ActionCommand::genesis(&self.config.genesis_seed, &self.config.player_name)
            .map_err(ChainError::from)?;
        let state = self
            .rules
            .genesis_state(&genesis)
            .map_err(|e| NodeError::Rules(e.to_string()))?;
        let block = self.commit_local(genesis, state)?;
        tracing::info!(player = %self.player, hash = %block.hash, "sealed genesis block");
        Ok(())
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<Request>,
        mut inbound: mpsc::Receiver<Inbound>,
        mut events: mpsc::Receiver<PeerEvent>,
    ) {
        let period = Duration::from_millis(self.config.sync.announce_interval_ms);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        self.announce().await;

        let stopped_by = loop {
            tokio::select! {
                biased;
                request = mailbox.recv() => match request {
                    Some(Request::Shutdown { reply }) => break Some(reply),
                    Some(request) => self.handle_request(request).await,
                    None => break None,
                },
                Some(event) = events.recv() => self.handle_peer_event(event).await,
                Some(message) = inbound.recv() => self.handle_inbound(message).await,
                _ = ticker.tick() => self.on_tick().await,
            }
        };

        // Stop taking work before flushing; queued callers see `Stopped`.
        drop(inbound);
        drop(events);
        mailbox.close();
        self.shutdown();
        if let Some(reply) = stopped_by {
            let _ = reply.send(());
        }
    }

    fn shutdown(mut self) {
        let snapshot = self.world.save();
        match self.store.save_world(&snapshot) {
            Ok(()) => tracing::info!(bytes = snapshot.len(), "saved world snapshot"),
            Err(error) => tracing::error!(%error, "failed to save world snapshot"),
        }
        tracing::info!(player = %self.player, "node stopped");
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::SubmitTransaction { tx, reply } => {
                let result = self.submit_transaction(tx).await;
                let _ = reply.send(result);
            }
            Request::Transfer {
                to,
                amount,
                fee,
                reply,
            } => {
                let result = self.transfer(&to, amount, fee).await;
                let _ = reply.send(result);
            }
            Request::MintReward {
                amount,
                reason,
                reply,
            } => {
                let result = self.mint_reward(amount, reason).await;
                let _ = reply.send(result);
            }
            Request::AppendCommand { command, reply } => {
                let result = self.append_command(command).await;
                let _ = reply.send(result);
            }
            Request::RecordCombat { entry, reply } => {
                let result = self.record_combat(entry).await;
                let _ = reply.send(result);
            }
            Request::PublishRanking { ranking, reply } => {
                let result = self.publish_ranking(ranking).await;
                let _ = reply.send(result);
            }
            Request::ClaimZone { zone_id, reply } => {
                let result = self.world.claim_zone(&zone_id, &self.player);
                let result = self.after_world_change(result.map_err(NodeError::from)).await;
                let _ = reply.send(result);
            }
            Request::DiscoverZone { zone_id, reply } => {
                let result = self.world.add_zone_discovery(&zone_id, &self.player);
                let result = self.after_world_change(result.map_err(NodeError::from)).await;
                let _ = reply.send(result);
            }
            Request::VerifyPlayer { player, reply } => {
                let _ = reply.send(Ok(self.verify_player(player)));
            }
            Request::Balance { address, reply } => {
                let _ = reply.send(Ok(self.ledger.balance(&address)));
            }
            Request::ChainLen { player, reply } => {
                let _ = reply.send(Ok(self.chains.len(&player)));
            }
            Request::WorldView { reply } => {
                let _ = reply.send(self.world.view().map_err(NodeError::from));
            }
            Request::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        self.sync.on_peer_event(&event, now_millis());
        if let PeerEvent::Connected(peer) = event {
            self.greet(&peer).await;
        }
    }

    async fn on_tick(&mut self) {
        for retry in self.sync.on_tick(&self.chains, now_millis()) {
            self.send_request(retry).await;
        }
        self.announce().await;
        if self.world_dirty {
            match self.store.save_world(&self.world.save()) {
                Ok(()) => self.world_dirty = false,
                Err(error) => tracing::error!(%error, "failed to save world snapshot"),
            }
        }
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Validate and apply on a copy, journal, then swap in the copy. A
    /// failed write leaves the live ledger untouched.
    fn journal(&mut self, entry: LedgerEntry) -> Result<()> {
        let mut next = self.ledger.clone();
        next.apply_entry(&entry)?;
        self.store.append_ledger_entry(&entry)?;
        self.ledger = next;
        Ok(())
    }

    async fn submit_transaction(&mut self, tx: SignedTx) -> Result<()> {
        self.journal(LedgerEntry::Transfer { tx: tx.clone() })?;
        self.broadcast(Message::Transaction(TransactionBroadcast { tx }))
            .await;
        Ok(())
    }

    async fn transfer(&mut self, to: &Address, amount: u64, fee: u64) -> Result<SignedTx> {
        let tx = self
            .ledger
            .sign_transfer(&self.wallet, to, amount, fee, self.current_tick())?;
        self.submit_transaction(tx.clone()).await?;
        Ok(tx)
    }

    /// Credit the local player and gossip the signed reward so peers
    /// credit it too.
    async fn mint_reward(&mut self, amount: u64, reason: String) -> Result<()> {
        let reward = Reward::new(self.player.clone(), amount, self.current_tick(), reason)?
            .sign(&self.wallet)?;
        self.journal(LedgerEntry::Mint {
            reward: reward.clone(),
        })?;
        self.broadcast(Message::Reward(RewardBroadcast { reward }))
            .await;
        Ok(())
    }

    // =========================================================================
    // Action chain
    // =========================================================================

    async fn append_command(&mut self, command: ActionCommand) -> Result<ActionBlock> {
        if command.kind().is_genesis() {
            return Err(NodeError::DuplicateGenesis);
        }
        let next = {
            let current = self
                .state
                .as_ref()
                .ok_or_else(|| NodeError::Rules("local chain has no genesis state".into()))?;
            self.rules
                .apply(current, &command)
                .map_err(|e| NodeError::Rules(e.to_string()))?
        };
        let block = self.commit_local(command, next)?;
        self.broadcast(Message::CommandBlock(CommandBlock {
            block: block.clone(),
        }))
        .await;
        Ok(block)
    }

    /// Seal, persist, then commit the next local block. Nothing reaches the
    /// in-memory chain unless the store accepted it.
    fn commit_local(&mut self, command: ActionCommand, next: R::State) -> Result<ActionBlock> {
        let state_hash = self.rules.state_hash(&next);
        let tick = command.tick();
        let verified =
            self.chains
                .prepare_local(&self.wallet, command, state_hash.clone(), now_millis())?;
        self.store.append_block(verified.block())?;
        let block = verified.block().clone();
        self.chains.commit(verified)?;

        let snapshot = PlayerSnapshot {
            player_id: self.player.clone(),
            tick,
            state_hash,
            state: serde_json::to_value(&next).map_err(StoreError::from)?,
        };
        self.store.put_snapshot(&snapshot)?;
        self.state = Some(next);
        tracing::debug!(index = block.index, hash = %block.hash, "appended local block");
        Ok(block)
    }

    fn verify_player(&mut self, player: PlayerId) -> ReplayReport {
        let report = verify_chain(&self.rules, self.chains.chain(&player));
        if report.valid {
            if self.chains.clear_suspect(&player).is_some() {
                tracing::info!(%player, "chain no longer suspect");
            }
        } else {
            self.chains.flag_suspect(player, report.clone(), now_millis());
        }
        report
    }

    fn current_tick(&self) -> u64 {
        self.chains
            .head(&self.player)
            .map_or(0, |head| head.command.tick())
    }

    fn current_era(&self) -> u32 {
        self.chains
            .chain(&self.player)
            .iter()
            .filter_map(|block| match block.command.kind() {
                CommandKind::AdvanceEra(args) => Some(args.era),
                _ => None,
            })
            .max()
            .unwrap_or(1)
    }

    // =========================================================================
    // Shared world
    // =========================================================================

    async fn record_combat(&mut self, mut entry: CombatLogEntry) -> Result<CombatLogEntry> {
        entry.sign_with(&self.wallet)?;
        let result = self.world.add_combat_log(&entry).map_err(NodeError::from);
        self.after_world_change(result).await?;
        self.broadcast(Message::CombatLog(CombatBroadcast {
            entry: entry.clone(),
        }))
        .await;
        Ok(entry)
    }

    async fn publish_ranking(&mut self, mut ranking: RankingData) -> Result<RankingData> {
        ranking.player_id = self.player.clone();
        ranking.sign_with(&self.wallet)?;
        let result = self.world.upsert_ranking(&ranking).map_err(NodeError::from);
        self.after_world_change(result).await?;
        Ok(ranking)
    }

    /// Gossip the changes made since the last publication.
    async fn after_world_change(&mut self, result: Result<()>) -> Result<()> {
        result?;
        self.world_dirty = true;
        let changes = self.world.changes_since(&self.published_heads);
        if changes.is_empty() {
            return Ok(());
        }
        let heads = self.world.heads();
        let update = StateBroadcast::changes(encode_heads(&heads), &changes);
        self.published_heads = heads;
        self.broadcast(Message::State(update)).await;
        Ok(())
    }

    fn merge_world_update(&mut self, update: &StateBroadcast) -> Result<()> {
        if let Some(snapshot) = update.decode_snapshot()? {
            let mut remote = SharedWorld::load(&snapshot)?;
            self.world.merge(&mut remote)?;
        }
        let changes = update.decode_changes()?;
        if !changes.is_empty() {
            self.world.apply_changes(&changes)?;
        }
        self.world_dirty = true;
        Ok(())
    }

    // =========================================================================
    // Peer traffic
    // =========================================================================

    async fn handle_inbound(&mut self, inbound: Inbound) {
        let envelope = match Envelope::from_bytes(&inbound.bytes) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::debug!(peer = %inbound.from, %error, "dropping undecodable message");
                return;
            }
        };
        let from = inbound.from;
        let now = now_millis();
        match envelope.message {
            Message::CommandBlock(CommandBlock { block }) => {
                let mut sink = StoreSink(&self.store);
                match self
                    .sync
                    .on_command_block(&mut self.chains, &mut sink, &from, block, now)
                {
                    BlockOutcome::Accepted { .. }
                    | BlockOutcome::Duplicate
                    | BlockOutcome::Unstored { .. } => {}
                    BlockOutcome::Behind { request, .. } | BlockOutcome::Rejected { request, .. } => {
                        if let Some(request) = request {
                            self.send_request(request).await;
                        }
                    }
                }
            }
            Message::ChainRequest(request) => {
                let response = self.sync.on_chain_request(&self.chains, &request);
                self.send_to(&from, Message::ChainResponse(response)).await;
            }
            Message::ChainResponse(response) => {
                let mut sink = StoreSink(&self.store);
                let outcome = self
                    .sync
                    .on_chain_response(&mut self.chains, &mut sink, &from, response, now);
                if let Some(next) = outcome.follow_up {
                    self.send_request(next).await;
                }
            }
            Message::PeerAnnounce(announce) => {
                let first_contact = self
                    .sync
                    .peers()
                    .get(&from)
                    .map_or(true, |meta| meta.announce.is_none());
                self.remember_peer(&from, &announce, now);
                if let Some(request) = self.sync.on_peer_announce(&self.chains, &from, announce, now) {
                    self.send_request(request).await;
                }
                if first_contact {
                    self.greet(&from).await;
                }
            }
            Message::Transaction(TransactionBroadcast { tx }) => {
                let id = tx.id().to_string();
                match self.journal(LedgerEntry::Transfer { tx }) {
                    Ok(()) => tracing::debug!(tx_id = %id, peer = %from, "admitted gossiped transaction"),
                    Err(error) => tracing::debug!(tx_id = %id, peer = %from, %error, "rejected gossiped transaction"),
                }
            }
            Message::Reward(RewardBroadcast { reward }) => {
                let id = reward.reward.id.clone();
                match self.journal(LedgerEntry::Mint { reward }) {
                    Ok(()) => tracing::debug!(reward_id = %id, peer = %from, "credited gossiped reward"),
                    Err(error) => tracing::debug!(reward_id = %id, peer = %from, %error, "rejected gossiped reward"),
                }
            }
            Message::State(update) => {
                if let Err(error) = self.merge_world_update(&update) {
                    tracing::warn!(peer = %from, %error, "failed to merge world update");
                }
            }
            Message::CombatLog(CombatBroadcast { entry }) => {
                if !entry.verify_seal() {
                    tracing::warn!(peer = %from, combat_id = %entry.id, "combat report with invalid seal");
                } else if entry.defender == self.player {
                    tracing::info!(attacker = %entry.attacker, winner = %entry.winner, "settlement was attacked");
                }
            }
        }
    }

    fn remember_peer(&self, peer: &str, announce: &PeerAnnounce, now: u64) {
        let result = self
            .store
            .record_peer_success(&announce.player_id, now)
            .and_then(|known| {
                if known {
                    return Ok(());
                }
                self.store.upsert_peer(&PeerRecord {
                    address: announce.player_id.clone(),
                    peer_id: peer.to_string(),
                    name: announce.name.clone(),
                    last_seen: now,
                    success_count: 1,
                })
            });
        if let Err(error) = result {
            tracing::warn!(%peer, %error, "failed to record peer");
        }
    }

    /// Send a new peer our world snapshot and our announcement.
    async fn greet(&mut self, peer: &str) {
        let heads = self.world.heads();
        let snapshot = self.world.save();
        let update = StateBroadcast::snapshot(encode_heads(&heads), &snapshot);
        self.send_to(peer, Message::State(update)).await;
        let announce = self.announcement();
        self.send_to(peer, Message::PeerAnnounce(announce)).await;
    }

    fn announcement(&self) -> PeerAnnounce {
        PeerAnnounce {
            player_id: self.player.clone(),
            name: self.config.player_name.clone(),
            era: self.current_era(),
            chain_length: self.chains.len(&self.player),
        }
    }

    async fn announce(&mut self) {
        let announce = self.announcement();
        self.broadcast(Message::PeerAnnounce(announce)).await;
    }

    async fn send_request(&mut self, out: OutboundRequest) {
        self.send_to(&out.peer, Message::ChainRequest(out.request))
            .await;
    }

    fn envelope(&self, message: Message) -> Option<Vec<u8>> {
        match Envelope::new(self.player.clone(), now_millis(), message).to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                tracing::error!(%error, "failed to encode message");
                None
            }
        }
    }

    async fn send_to(&mut self, peer: &str, message: Message) {
        let kind = message.kind();
        let Some(bytes) = self.envelope(message) else {
            return;
        };
        if let Err(error) = self.transport.send(peer, bytes).await {
            tracing::debug!(%peer, ?kind, %error, "direct send failed");
        }
    }

    async fn broadcast(&mut self, message: Message) {
        let topic = message.topic();
        let Some(bytes) = self.envelope(message) else {
            return;
        };
        if let Err(error) = self.transport.publish(topic, bytes).await {
            tracing::warn!(topic = topic.name(), %error, "publish failed");
        }
    }
}

/// Writes remote blocks to the node's store before they are committed.
struct StoreSink<'a>(&'a Store);

impl BlockSink for StoreSink<'_> {
    fn persist(&mut self, block: &ActionBlock) -> std::result::Result<(), SyncError> {
        self.0
            .append_block(block)
            .map_err(|error| SyncError::Storage(error.to_string()))
    }
}

/// Local simulation state after replaying `blocks` from genesis.
fn rebuild_state<R: ReplayRules>(rules: &R, blocks: &[ActionBlock]) -> Result<R::State> {
    let rules_error = |e: R::Error| NodeError::Rules(e.to_string());
    let Some((genesis, rest)) = blocks.split_first() else {
        return Err(NodeError::Rules("empty chain".into()));
    };
    let mut state = rules.genesis_state(&genesis.command).map_err(rules_error)?;
    for block in rest {
        state = rules.apply(&state, &block.command).map_err(rules_error)?;
    }
    Ok(state)
}
