//! # Hegemon Store
//!
//! Local persistence on `redb`, an embedded transactional key-value store
//! with MVCC: one writer at a time, readers never blocked.
//!
//! Tables: player state snapshots keyed by (player, tick), an append-only
//! action block table keyed by hash with a (player, index) index, known
//! peers, the ledger journal and the latest world snapshot. A `metadata`
//! table carries the schema version that gates incremental migrations.

mod error;
mod records;
mod schema;
mod store;

pub use error::{Result, StoreError};
pub use records::{PeerRecord, PlayerSnapshot};
pub use schema::SCHEMA_VERSION;
pub use store::Store;
