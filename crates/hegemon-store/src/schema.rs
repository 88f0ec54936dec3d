//! Table layout and incremental migrations.

use crate::error::{Result, StoreError};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

pub(crate) const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");
/// (player, tick) → JSON `PlayerSnapshot`.
pub(crate) const PLAYER_SNAPSHOTS: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("player_snapshots");
/// block hash → JSON `ActionBlock`. Append-only.
pub(crate) const ACTION_BLOCKS: TableDefinition<&str, &str> = TableDefinition::new("action_blocks");
/// (player, index) → block hash.
pub(crate) const CHAIN_INDEX: TableDefinition<(&str, u64), &str> = TableDefinition::new("chain_index");
/// peer address → JSON `PeerRecord`.
pub(crate) const KNOWN_PEERS: TableDefinition<&str, &str> = TableDefinition::new("known_peers");
/// sequence number → JSON `LedgerEntry`.
pub(crate) const LEDGER_JOURNAL: TableDefinition<u64, &str> = TableDefinition::new("ledger_journal");
pub(crate) const WORLD_SNAPSHOT: TableDefinition<&str, &[u8]> = TableDefinition::new("world_snapshot");

pub(crate) const SCHEMA_VERSION_KEY: &str = "schema_version";
pub(crate) const WORLD_SNAPSHOT_KEY: &str = "current";

/// Schema version after every migration has run.
pub const SCHEMA_VERSION: u64 = 2;

struct Migration {
    version: u64,
    description: &'static str,
    apply: fn(&WriteTransaction) -> Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "player snapshots, action chains and known peers",
        apply: create_chain_tables,
    },
    Migration {
        version: 2,
        description: "ledger journal and world snapshot",
        apply: create_journal_tables,
    },
];

fn create_chain_tables(txn: &WriteTransaction) -> Result<()> {
    txn.open_table(PLAYER_SNAPSHOTS)?;
    txn.open_table(ACTION_BLOCKS)?;
    txn.open_table(CHAIN_INDEX)?;
    txn.open_table(KNOWN_PEERS)?;
    Ok(())
}

fn create_journal_tables(txn: &WriteTransaction) -> Result<()> {
    txn.open_table(LEDGER_JOURNAL)?;
    txn.open_table(WORLD_SNAPSHOT)?;
    Ok(())
}

/// Stored schema version, 0 for a fresh database.
pub(crate) fn read_version(txn: &WriteTransaction) -> Result<u64> {
    let table = txn.open_table(METADATA)?;
    let version = table.get(SCHEMA_VERSION_KEY)?.map(|v| v.value());
    Ok(version.unwrap_or(0))
}

/// Run every migration newer than the stored version.
///
/// Each migration commits together with its version bump, so an interrupted
/// run resumes at the first missing step and re-running is a no-op.
pub(crate) fn migrate(db: &Database) -> Result<u64> {
    for migration in MIGRATIONS {
        let txn = db.begin_write()?;
        let current = read_version(&txn)?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::FutureSchema {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }
        if current >= migration.version {
            txn.abort()?;
            continue;
        }
        (migration.apply)(&txn)?;
        txn.open_table(METADATA)?
            .insert(SCHEMA_VERSION_KEY, migration.version)?;
        txn.commit()?;
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applied schema migration"
        );
    }

    let txn = db.begin_write()?;
    let version = read_version(&txn)?;
    txn.abort()?;
    Ok(version)
}
