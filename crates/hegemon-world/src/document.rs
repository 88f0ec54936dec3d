//! The replicated world document.
//!
//! Layout under the Automerge root:
//!
//! | key               | type | contents                                   |
//! |-------------------|------|--------------------------------------------|
//! | `zoneClaims`      | map  | zone id → claimant (last writer wins)      |
//! | `zoneDiscoveries` | map  | `"{zoneId}/{playerId}"` → `true` (add-wins)|
//! | `rankings`        | map  | player id → JSON [`RankingData`]           |
//! | `tradeOffers`     | list | JSON [`TradeOffer`], newest last           |
//! | `combatLogs`      | list | JSON [`CombatLogEntry`], newest last       |
//! | `alliances`       | map  | alliance id → JSON [`AllianceData`]        |
//!
//! Records are stored as whole JSON strings so an upsert replaces the record
//! atomically instead of merging individual fields from concurrent writers.
//! A record that does not decode is skipped when reading a whole container;
//! one bad write from a peer never hides the rest of the world.
//!
//! Capped lists are trimmed after every local append and after every merge,
//! since two replicas appending at the cap concurrently merge to cap + 1.

use crate::error::{Result, WorldError};
use crate::records::{AllianceData, CombatLogEntry, RankingData, TradeOffer, WorldView, ZoneData};
use automerge::transaction::{CommitOptions, Transactable};
use automerge::{ActorId, AutoCommit, ChangeHash, ObjId, ObjType, ReadDoc, ScalarValue, Value, ROOT};
use hegemon_core::PlayerId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Most recent trade offers kept.
pub const TRADE_OFFER_CAP: usize = 50;
/// Most recent combat log entries kept.
pub const COMBAT_LOG_CAP: usize = 100;

const ZONE_CLAIMS: &str = "zoneClaims";
const ZONE_DISCOVERIES: &str = "zoneDiscoveries";
const RANKINGS: &str = "rankings";
const TRADE_OFFERS: &str = "tradeOffers";
const COMBAT_LOGS: &str = "combatLogs";
const ALLIANCES: &str = "alliances";

// Every replica creates the root containers with this exact change, so their
// object ids coincide and independent documents merge into one structure.
const GENESIS_ACTOR: &[u8] = b"hegemon-world-genesis";

struct Containers {
    zone_claims: ObjId,
    zone_discoveries: ObjId,
    rankings: ObjId,
    trade_offers: ObjId,
    combat_logs: ObjId,
    alliances: ObjId,
}

/// One replica of the shared world.
pub struct SharedWorld {
    doc: AutoCommit,
    containers: Containers,
}

impl SharedWorld {
    /// Empty world, writing as a fresh random actor.
    pub fn new() -> Result<Self> {
        let mut doc = AutoCommit::new().with_actor(ActorId::from(GENESIS_ACTOR));
        let containers = Containers {
            zone_claims: doc.put_object(ROOT, ZONE_CLAIMS, ObjType::Map)?,
            zone_discoveries: doc.put_object(ROOT, ZONE_DISCOVERIES, ObjType::Map)?,
            rankings: doc.put_object(ROOT, RANKINGS, ObjType::Map)?,
            trade_offers: doc.put_object(ROOT, TRADE_OFFERS, ObjType::List)?,
            combat_logs: doc.put_object(ROOT, COMBAT_LOGS, ObjType::List)?,
            alliances: doc.put_object(ROOT, ALLIANCES, ObjType::Map)?,
        };
        doc.commit_with(CommitOptions::default().with_time(0));
        doc.set_actor(ActorId::random());
        Ok(Self { doc, containers })
    }

    /// Rebuild a replica from a [`SharedWorld::save`] snapshot.
    pub fn load(snapshot: &[u8]) -> Result<Self> {
        let doc = AutoCommit::load(snapshot)?;
        Self::from_doc(doc)
    }

    fn from_doc(doc: AutoCommit) -> Result<Self> {
        let containers = Containers {
            zone_claims: container(&doc, ZONE_CLAIMS)?,
            zone_discoveries: container(&doc, ZONE_DISCOVERIES)?,
            rankings: container(&doc, RANKINGS)?,
            trade_offers: container(&doc, TRADE_OFFERS)?,
            combat_logs: container(&doc, COMBAT_LOGS)?,
            alliances: container(&doc, ALLIANCES)?,
        };
        Ok(Self { doc, containers })
    }

    /// Independent copy that writes as a new actor.
    pub fn fork(&mut self) -> Result<Self> {
        let doc = self.doc.fork().with_actor(ActorId::random());
        Self::from_doc(doc)
    }

    // Zones

    /// Record that `player` discovered `zone_id`. Idempotent.
    pub fn add_zone_discovery(&mut self, zone_id: &str, player: &PlayerId) -> Result<()> {
        let key = discovery_key(zone_id, player);
        if self.doc.get(&self.containers.zone_discoveries, key.as_str())?.is_none() {
            self.doc.put(&self.containers.zone_discoveries, key.as_str(), true)?;
        }
        Ok(())
    }

    /// Set the claimant of `zone_id` to `player`, and mark it discovered by
    /// them.
    ///
    /// Concurrent claims by different players both succeed locally; after
    /// merge exactly one claimant survives, chosen by the CRDT's
    /// deterministic conflict resolution, not by game rules. Callers must
    /// have checked eligibility (for example that the zone was explored)
    /// before claiming.
    pub fn claim_zone(&mut self, zone_id: &str, player: &PlayerId) -> Result<()> {
        self.doc
            .put(&self.containers.zone_claims, zone_id, player.as_str())?;
        self.add_zone_discovery(zone_id, player)
    }

    /// One zone, if anyone has discovered or claimed it.
    pub fn zone(&self, zone_id: &str) -> Result<Option<ZoneData>> {
        Ok(self.zones()?.remove(zone_id))
    }

    /// Every zone anyone has touched.
    pub fn zones(&self) -> Result<BTreeMap<String, ZoneData>> {
        let mut zones: BTreeMap<String, ZoneData> = BTreeMap::new();
        for key in self.doc.keys(&self.containers.zone_discoveries) {
            let Some((zone_id, player)) = key.rsplit_once('/') else {
                tracing::warn!(key = %key, "skipping malformed discovery key");
                continue;
            };
            zones
                .entry(zone_id.to_string())
                .or_default()
                .discovered_by
                .insert(PlayerId::new_unchecked(player));
        }
        for zone_id in self.doc.keys(&self.containers.zone_claims) {
            let claimant = self
                .doc
                .get(&self.containers.zone_claims, zone_id.as_str())?
                .and_then(|(value, _)| scalar_text(&value));
            zones.entry(zone_id).or_default().claimed_by = claimant.map(PlayerId::new_unchecked);
        }
        Ok(zones)
    }

    // Rankings

    /// Replace the ranking of `ranking.player_id`.
    pub fn upsert_ranking(&mut self, ranking: &RankingData) -> Result<()> {
        let key = ranking.player_id.as_str();
        self.put_record(MapName::Rankings, key, ranking)
    }

    /// Ranking published by `player`.
    pub fn ranking(&self, player: &PlayerId) -> Result<Option<RankingData>> {
        self.get_record(&self.containers.rankings, RANKINGS, player.as_str())
    }

    /// All readable rankings, keyed by player.
    pub fn rankings(&self) -> Result<BTreeMap<PlayerId, RankingData>> {
        Ok(self
            .map_records::<RankingData>(&self.containers.rankings, RANKINGS)?
            .into_iter()
            .map(|(key, record)| (PlayerId::new_unchecked(key), record))
            .collect())
    }

    // Trade offers

    /// Append an offer, evicting the oldest beyond [`TRADE_OFFER_CAP`].
    pub fn add_trade_offer(&mut self, offer: &TradeOffer) -> Result<()> {
        let obj = self.containers.trade_offers.clone();
        self.append_bounded(&obj, offer, TRADE_OFFER_CAP)
    }

    /// Remove the first offer with `offer_id`. Returns whether one was found.
    pub fn remove_trade_offer(&mut self, offer_id: &str) -> Result<bool> {
        let offers =
            self.list_entries::<TradeOffer>(&self.containers.trade_offers, TRADE_OFFERS)?;
        match offers.iter().find(|(_, offer)| offer.id == offer_id) {
            Some((index, _)) => {
                self.doc.delete(&self.containers.trade_offers, *index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Current offers, oldest first.
    pub fn trade_offers(&self) -> Result<Vec<TradeOffer>> {
        self.list_records(&self.containers.trade_offers, TRADE_OFFERS, TRADE_OFFER_CAP)
    }

    // Combat logs

    /// Append an entry, evicting the oldest beyond [`COMBAT_LOG_CAP`].
    pub fn add_combat_log(&mut self, entry: &CombatLogEntry) -> Result<()> {
        let obj = self.containers.combat_logs.clone();
        self.append_bounded(&obj, entry, COMBAT_LOG_CAP)
    }

    /// Logged battles, oldest first.
    pub fn combat_logs(&self) -> Result<Vec<CombatLogEntry>> {
        self.list_records(&self.containers.combat_logs, COMBAT_LOGS, COMBAT_LOG_CAP)
    }

    // Alliances

    /// Create or replace the alliance with `alliance.id`.
    pub fn upsert_alliance(&mut self, alliance: &AllianceData) -> Result<()> {
        self.put_record(MapName::Alliances, &alliance.id, alliance)
    }

    /// Delete the alliance with `alliance_id`. Returns whether it existed.
    pub fn remove_alliance(&mut self, alliance_id: &str) -> Result<bool> {
        if self.doc.get(&self.containers.alliances, alliance_id)?.is_none() {
            return Ok(false);
        }
        self.doc.delete(&self.containers.alliances, alliance_id)?;
        Ok(true)
    }

    /// All readable alliances, keyed by id.
    pub fn alliances(&self) -> Result<BTreeMap<String, AllianceData>> {
        self.map_records(&self.containers.alliances, ALLIANCES)
    }

    /// Materialise the whole world as plain values.
    pub fn view(&self) -> Result<WorldView> {
        Ok(WorldView {
            zones: self.zones()?,
            rankings: self.rankings()?,
            trade_offers: self.trade_offers()?,
            combat_logs: self.combat_logs()?,
            alliances: self.alliances()?,
        })
    }

    // Replication

    /// Full binary snapshot for onboarding a new peer.
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// Current heads, identifying exactly the changes this replica holds.
    pub fn heads(&mut self) -> Vec<ChangeHash> {
        self.doc.get_heads()
    }

    /// Encoded changes that a replica at `since` does not have yet.
    pub fn changes_since(&mut self, since: &[ChangeHash]) -> Vec<Vec<u8>> {
        self.doc
            .get_changes(since)
            .into_iter()
            .map(|change| change.raw_bytes().to_vec())
            .collect()
    }

    /// Fold in changes produced by [`SharedWorld::changes_since`] on another
    /// replica. Already known changes are ignored.
    pub fn apply_changes(&mut self, changes: &[Vec<u8>]) -> Result<()> {
        for change in changes {
            self.doc.load_incremental(change)?;
        }
        self.enforce_caps()
    }

    /// Merge another replica into this one. Returns the number of new heads.
    pub fn merge(&mut self, other: &mut SharedWorld) -> Result<usize> {
        let heads = self.doc.merge(&mut other.doc)?.len();
        self.enforce_caps()?;
        Ok(heads)
    }

    fn enforce_caps(&mut self) -> Result<()> {
        let trade_offers = self.containers.trade_offers.clone();
        self.trim_list(&trade_offers, TRADE_OFFER_CAP)?;
        let combat_logs = self.containers.combat_logs.clone();
        self.trim_list(&combat_logs, COMBAT_LOG_CAP)
    }

    /// Delete from the front until at most `cap` entries remain.
    fn trim_list(&mut self, obj: &ObjId, cap: usize) -> Result<()> {
        let excess = self.doc.length(obj).saturating_sub(cap);
        for _ in 0..excess {
            self.doc.delete(obj, 0usize)?;
        }
        if excess > 0 {
            tracing::debug!(excess, cap, "trimmed capped list");
        }
        Ok(())
    }

    fn put_record<T: Serialize>(&mut self, map: MapName, key: &str, record: &T) -> Result<()> {
        let obj = match map {
            MapName::Rankings => &self.containers.rankings,
            MapName::Alliances => &self.containers.alliances,
        };
        let text = serde_json::to_string(record)?;
        self.doc.put(obj, key, text)?;
        Ok(())
    }

    fn append_bounded<T: Serialize>(&mut self, obj: &ObjId, record: &T, cap: usize) -> Result<()> {
        let text = serde_json::to_string(record)?;
        let len = self.doc.length(obj);
        self.doc.insert(obj, len, text)?;
        self.trim_list(obj, cap)
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        obj: &ObjId,
        container: &'static str,
        key: &str,
    ) -> Result<Option<T>> {
        match self.doc.get(obj, key)? {
            Some((value, _)) => decode_record(&value, container).map(Some),
            None => Ok(None),
        }
    }

    /// Every decodable record in a map container.
    fn map_records<T: DeserializeOwned>(
        &self,
        obj: &ObjId,
        container: &'static str,
    ) -> Result<BTreeMap<String, T>> {
        let mut records = BTreeMap::new();
        for key in self.doc.keys(obj) {
            let Some((value, _)) = self.doc.get(obj, key.as_str())? else {
                continue;
            };
            match decode_record(&value, container) {
                Ok(record) => {
                    records.insert(key, record);
                }
                Err(error) => tracing::warn!(container, %key, %error, "skipping corrupt record"),
            }
        }
        Ok(records)
    }

    /// Decodable records of a list container with their positions.
    fn list_entries<T: DeserializeOwned>(
        &self,
        obj: &ObjId,
        container: &'static str,
    ) -> Result<Vec<(usize, T)>> {
        let len = self.doc.length(obj);
        let mut records = Vec::with_capacity(len);
        for index in 0..len {
            let Some((value, _)) = self.doc.get(obj, index)? else {
                continue;
            };
            match decode_record(&value, container) {
                Ok(record) => records.push((index, record)),
                Err(error) => tracing::warn!(container, index, %error, "skipping corrupt record"),
            }
        }
        Ok(records)
    }

    /// The newest `cap` decodable records of a list container.
    fn list_records<T: DeserializeOwned>(
        &self,
        obj: &ObjId,
        container: &'static str,
        cap: usize,
    ) -> Result<Vec<T>> {
        let entries = self.list_entries(obj, container)?;
        let skip = entries.len().saturating_sub(cap);
        Ok(entries.into_iter().skip(skip).map(|(_, record)| record).collect())
    }
}

#[derive(Clone, Copy)]
enum MapName {
    Rankings,
    Alliances,
}

fn container(doc: &AutoCommit, key: &'static str) -> Result<ObjId> {
    match doc.get(ROOT, key)? {
        Some((Value::Object(_), id)) => Ok(id),
        _ => Err(WorldError::MissingContainer(key)),
    }
}

fn discovery_key(zone_id: &str, player: &PlayerId) -> String {
    format!("{zone_id}/{player}")
}

fn scalar_text(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Scalar(scalar) => match &**scalar {
            ScalarValue::Str(text) => Some(text.to_string()),
            _ => None,
        },
        Value::Object(_) => None,
    }
}

fn decode_record<T: DeserializeOwned>(value: &Value<'_>, container: &'static str) -> Result<T> {
    let text = scalar_text(value).ok_or_else(|| WorldError::CorruptRecord {
        container,
        reason: "record is not a string".to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| WorldError::CorruptRecord {
        container,
        reason: e.to_string(),
    })
}

/// Parse hex-encoded heads received from a peer.
pub fn parse_heads(heads: &[String]) -> Result<Vec<ChangeHash>> {
    heads
        .iter()
        .map(|text| {
            let mut bytes = [0u8; 32];
            hex::decode_to_slice(text, &mut bytes).map_err(|_| WorldError::BadHead(text.clone()))?;
            Ok(ChangeHash(bytes))
        })
        .collect()
}

/// Hex encoding of heads for the wire.
pub fn encode_heads(heads: &[ChangeHash]) -> Vec<String> {
    heads.iter().map(|head| hex::encode(head.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signed::Seal;

    fn player(seed: u8) -> PlayerId {
        PlayerId::from_public_key(&[seed; 32])
    }

    fn offer(id: &str) -> TradeOffer {
        TradeOffer {
            id: id.to_string(),
            seller: player(1),
            offer: BTreeMap::from([("wood".to_string(), 10)]),
            price: 3,
            created_at: 0,
            expires_at: None,
            seal: Seal::default(),
        }
    }

    fn battle(id: usize) -> CombatLogEntry {
        CombatLogEntry {
            id: format!("c-{id}"),
            attacker: player(1),
            defender: player(2),
            zone_id: None,
            winner: player(1),
            attacker_losses: BTreeMap::new(),
            defender_losses: BTreeMap::new(),
            loot: 0,
            tick: id as u64,
            timestamp: 0,
            seal: Seal::default(),
        }
    }

    #[test]
    fn discovery_is_idempotent() {
        let mut world = SharedWorld::new().unwrap();
        world.add_zone_discovery("z-1", &player(1)).unwrap();
        world.add_zone_discovery("z-1", &player(1)).unwrap();
        world.add_zone_discovery("z-1", &player(2)).unwrap();

        let zone = world.zone("z-1").unwrap().unwrap();
        assert_eq!(zone.discovered_by.len(), 2);
        assert_eq!(zone.claimed_by, None);
    }

    #[test]
    fn claim_sets_claimant_and_discovery() {
        let mut world = SharedWorld::new().unwrap();
        world.claim_zone("z-9", &player(3)).unwrap();
        let zone = world.zone("z-9").unwrap().unwrap();
        assert_eq!(zone.claimed_by, Some(player(3)));
        assert!(zone.discovered_by.contains(&player(3)));

        world.claim_zone("z-9", &player(4)).unwrap();
        assert_eq!(world.zone("z-9").unwrap().unwrap().claimed_by, Some(player(4)));
    }

    #[test]
    fn trade_offers_are_capped_oldest_first() {
        let mut world = SharedWorld::new().unwrap();
        for i in 0..TRADE_OFFER_CAP + 5 {
            world.add_trade_offer(&offer(&format!("t-{i}"))).unwrap();
        }
        let offers = world.trade_offers().unwrap();
        assert_eq!(offers.len(), TRADE_OFFER_CAP);
        assert_eq!(offers[0].id, "t-5");
        assert_eq!(offers.last().unwrap().id, format!("t-{}", TRADE_OFFER_CAP + 4));
    }

    #[test]
    fn combat_log_is_capped() {
        let mut world = SharedWorld::new().unwrap();
        for i in 0..COMBAT_LOG_CAP + 1 {
            world.add_combat_log(&battle(i)).unwrap();
        }
        let logs = world.combat_logs().unwrap();
        assert_eq!(logs.len(), COMBAT_LOG_CAP);
        assert_eq!(logs[0].id, "c-1");
    }

    #[test]
    fn remove_trade_offer_removes_first_match_only() {
        let mut world = SharedWorld::new().unwrap();
        world.add_trade_offer(&offer("a")).unwrap();
        world.add_trade_offer(&offer("b")).unwrap();
        world.add_trade_offer(&offer("a")).unwrap();

        assert!(world.remove_trade_offer("a").unwrap());
        let ids: Vec<_> = world.trade_offers().unwrap().into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(!world.remove_trade_offer("zzz").unwrap());
    }

    #[test]
    fn concurrent_appends_at_the_cap_merge_back_to_the_cap() {
        let mut alice = SharedWorld::new().unwrap();
        for i in 0..TRADE_OFFER_CAP {
            alice.add_trade_offer(&offer(&format!("t-{i}"))).unwrap();
        }
        let mut bob = alice.fork().unwrap();
        alice.add_trade_offer(&offer("from-alice")).unwrap();
        bob.add_trade_offer(&offer("from-bob")).unwrap();

        alice.merge(&mut bob).unwrap();
        bob.merge(&mut alice).unwrap();

        let offers = alice.trade_offers().unwrap();
        assert_eq!(offers.len(), TRADE_OFFER_CAP);
        assert_eq!(alice.doc.length(&alice.containers.trade_offers), TRADE_OFFER_CAP);
        assert_eq!(bob.doc.length(&bob.containers.trade_offers), TRADE_OFFER_CAP);
        assert!(offers.iter().any(|o| o.id == "from-alice"));
        assert!(offers.iter().any(|o| o.id == "from-bob"));
        assert_eq!(alice.view().unwrap(), bob.view().unwrap());
    }

    #[test]
    fn incremental_changes_respect_the_combat_log_cap() {
        let mut alice = SharedWorld::new().unwrap();
        for i in 0..COMBAT_LOG_CAP {
            alice.add_combat_log(&battle(i)).unwrap();
        }
        let base = alice.heads();
        let mut bob = alice.fork().unwrap();
        alice.add_combat_log(&battle(1_000)).unwrap();
        bob.add_combat_log(&battle(2_000)).unwrap();

        let changes = bob.changes_since(&base);
        alice.apply_changes(&changes).unwrap();

        let logs = alice.combat_logs().unwrap();
        assert_eq!(logs.len(), COMBAT_LOG_CAP);
        assert_eq!(alice.doc.length(&alice.containers.combat_logs), COMBAT_LOG_CAP);
        assert!(logs.iter().all(|entry| entry.id != "c-0" && entry.id != "c-1"));
    }

    #[test]
    fn corrupt_peer_records_are_skipped() {
        let mut world = SharedWorld::new().unwrap();
        world.add_trade_offer(&offer("good")).unwrap();
        let base = world.heads();

        let mut peer = world.fork().unwrap();
        let offers = peer.containers.trade_offers.clone();
        let rankings = peer.containers.rankings.clone();
        peer.doc.insert(&offers, 1usize, "not json").unwrap();
        peer.doc.put(&rankings, "bogus", 7_i64).unwrap();
        world.apply_changes(&peer.changes_since(&base)).unwrap();

        let view = world.view().unwrap();
        let ids: Vec<_> = view.trade_offers.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
        assert!(view.rankings.is_empty());

        // Positions still line up with the raw list around the bad entry.
        world.add_trade_offer(&offer("later")).unwrap();
        assert!(world.remove_trade_offer("later").unwrap());
        assert_eq!(world.doc.length(&world.containers.trade_offers), 2);
        assert_eq!(world.trade_offers().unwrap().len(), 1);
    }

    #[test]
    fn alliances_are_replaced_whole() {
        let mut world = SharedWorld::new().unwrap();
        let mut alliance = AllianceData {
            id: "al-1".to_string(),
            name: "North".to_string(),
            founder: player(1),
            members: [player(1), player(2)].into(),
            created_at: 5,
            seal: Seal::default(),
        };
        world.upsert_alliance(&alliance).unwrap();
        alliance.members.remove(&player(2));
        world.upsert_alliance(&alliance).unwrap();

        assert_eq!(world.alliances().unwrap()["al-1"].members.len(), 1);
        assert!(world.remove_alliance("al-1").unwrap());
        assert!(!world.remove_alliance("al-1").unwrap());
        assert!(world.alliances().unwrap().is_empty());
    }

    #[test]
    fn snapshot_round_trip_preserves_view() {
        let mut world = SharedWorld::new().unwrap();
        world.claim_zone("z-1", &player(1)).unwrap();
        world.add_trade_offer(&offer("t")).unwrap();

        let restored = SharedWorld::load(&world.save()).unwrap();
        assert_eq!(restored.view().unwrap(), world.view().unwrap());
    }

    #[test]
    fn heads_survive_hex_encoding() {
        let mut world = SharedWorld::new().unwrap();
        world.claim_zone("z-1", &player(1)).unwrap();
        let heads = world.heads();
        assert_eq!(parse_heads(&encode_heads(&heads)).unwrap(), heads);
        assert!(parse_heads(&["nope".to_string()]).is_err());
    }
}
