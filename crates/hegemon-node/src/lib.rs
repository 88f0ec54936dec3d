//! # Hegemon Node
//!
//! A peer in the Hegemon network. [`Node::start`] loads the wallet, opens
//! the store, rebuilds the ledger and chains from it and spawns one task
//! that owns all of that state. Everything else talks to it through a
//! [`NodeHandle`].
//!
//! Shutting down stops intake first, lets the operation in progress finish,
//! snapshots the shared world and only then closes the store.

/// TOML configuration with environment overrides.
pub mod config;
mod error;
mod handle;
/// Tracing subscriber setup.
pub mod logging;
mod node;

pub use config::{NodeConfig, SyncSettings};
pub use error::{NodeError, Result};
pub use handle::NodeHandle;
pub use logging::init_tracing;
pub use node::Node;
