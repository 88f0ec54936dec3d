//! # Hegemon Chain
//!
//! Every player keeps a linear, hash-linked log of the commands they issued.
//! Each [`ActionBlock`] commits to the resulting state hash and is signed by
//! the player's wallet, so peers can audit a history without ever seeing the
//! private state behind it.
//!
//! - **Local append**: [`ChainBook::append_local`] builds, hashes and signs
//!   the next block. Only the wallet that owns the chain can produce it.
//! - **Fast path**: [`ChainBook::verify_remote`] checks linkage, hash,
//!   signer and signature before a foreign block is stored.
//! - **Deep verification**: [`verify_chain`] replays commands through the
//!   external [`ReplayRules`] and stops at the first state hash that differs.
//!
//! A [`ChainBook`] is an owned value: the holder of `&mut ChainBook` is the
//! single writer, which makes verify-then-commit one critical section.

mod block;
mod book;
mod command;
mod error;
mod replay;
/// Deterministic rules and chain builders for tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use block::ActionBlock;
pub use book::{ChainBook, SuspectRecord, VerifiedBlock};
pub use command::{
    ActionCommand, AttackArgs, BuildArgs, CommandError, CommandKind, EraArgs, GenesisArgs,
    TradeArgs, TrainArgs, ZoneArgs,
};
pub use error::{ChainError, Result};
pub use replay::{verify_chain, verify_history, ReplayReport, ReplayRules, ReplayStep};
