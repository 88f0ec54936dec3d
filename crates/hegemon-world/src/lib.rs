//! # Hegemon World
//!
//! Publicly shared facts that every peer replicates: zone discovery and
//! claims, rankings, trade offers, alliances and the combat log.
//!
//! [`SharedWorld`] wraps an Automerge document. Concurrent updates from any
//! number of peers converge under merge regardless of delivery order, so no
//! locking is needed around replication. Authenticity is separate from
//! replication: records carry a [`Seal`] that any peer can check with
//! [`verify_signed_data`].

mod document;
mod error;
mod records;
mod signed;

pub use automerge::ChangeHash;
pub use document::{encode_heads, parse_heads, SharedWorld, COMBAT_LOG_CAP, TRADE_OFFER_CAP};
pub use error::{Result, WorldError};
pub use records::{AllianceData, CombatLogEntry, RankingData, TradeOffer, WorldView, ZoneData};
pub use signed::{compute_data_hash, verify_signed_data, Seal, SignedRecord};
