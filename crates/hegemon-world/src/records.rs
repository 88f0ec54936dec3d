//! Records published in the shared world.

use crate::signed::{Seal, SignedRecord};
use hegemon_core::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Assembled view of one zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneData {
    /// Current owner; last writer wins
    pub claimed_by: Option<PlayerId>,
    /// Everyone who explored the zone
    pub discovered_by: BTreeSet<PlayerId>,
}

/// Public standing of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingData {
    /// Whose standing this is
    pub player_id: PlayerId,
    /// Settlement name
    pub name: String,
    /// Era reached
    pub era: u32,
    /// Ranking score
    pub prestige: u64,
    /// Token balance at publish time
    pub tokens: u64,
    /// Units by type
    #[serde(default)]
    pub army: BTreeMap<String, u64>,
    /// Stockpiles by resource
    #[serde(default)]
    pub resources: BTreeMap<String, u64>,
    /// Publish time in milliseconds
    pub updated_at: u64,
    /// Signature by `player_id`
    #[serde(flatten)]
    pub seal: Seal,
}

/// Resources offered for tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOffer {
    /// Unique offer id
    pub id: String,
    /// Player selling
    pub seller: PlayerId,
    /// Resources put up for sale.
    pub offer: BTreeMap<String, u64>,
    /// Asking price in tokens.
    pub price: u64,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    /// No longer valid after this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Signature by `seller`.
    #[serde(flatten)]
    pub seal: Seal,
}

/// A named group of players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllianceData {
    /// Unique alliance id
    pub id: String,
    /// Display name
    pub name: String,
    /// Player who created it
    pub founder: PlayerId,
    /// Current members, founder included
    pub members: BTreeSet<PlayerId>,
    /// Milliseconds since the Unix epoch
    pub created_at: u64,
    /// Signature by the last writer
    #[serde(flatten)]
    pub seal: Seal,
}

/// Outcome of one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatLogEntry {
    /// Unique battle id
    pub id: String,
    /// Player who attacked
    pub attacker: PlayerId,
    /// Player who was attacked
    pub defender: PlayerId,
    /// Zone fought over, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    /// Either `attacker` or `defender`
    pub winner: PlayerId,
    /// Attacker units lost, by type
    #[serde(default)]
    pub attacker_losses: BTreeMap<String, u64>,
    /// Defender units lost, by type
    #[serde(default)]
    pub defender_losses: BTreeMap<String, u64>,
    /// Tokens taken by the winner
    #[serde(default)]
    pub loot: u64,
    /// Simulation tick of the battle
    pub tick: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Signature by whoever recorded it
    #[serde(flatten)]
    pub seal: Seal,
}

macro_rules! sealed {
    ($($record:ty),+) => {
        $(
            impl SignedRecord for $record {
                fn seal(&self) -> &Seal {
                    &self.seal
                }

                fn seal_mut(&mut self) -> &mut Seal {
                    &mut self.seal
                }
            }
        )+
    };
}

sealed!(RankingData, TradeOffer, AllianceData, CombatLogEntry);

/// Plain copy of the whole shared world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldView {
    /// Zones by id
    pub zones: BTreeMap<String, ZoneData>,
    /// Rankings by player
    pub rankings: BTreeMap<PlayerId, RankingData>,
    /// Offers, oldest first
    pub trade_offers: Vec<TradeOffer>,
    /// Battles, oldest first
    pub combat_logs: Vec<CombatLogEntry>,
    /// Alliances by id
    pub alliances: BTreeMap<String, AllianceData>,
}
