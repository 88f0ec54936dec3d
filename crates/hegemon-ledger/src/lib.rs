//! # Hegemon Ledger
//!
//! Moves the scarce token between wallets without a trusted bank.
//!
//! - [`Ledger`] owns balances and nonces. It is a plain owned value: whoever
//!   holds `&mut Ledger` is the single writer, and snapshot accessors return
//!   copies.
//! - [`TxValidator`] is pure. It checks signature, balance, nonce and amount
//!   in that order and reports the first failure.
//! - [`Ledger::admit`] runs validation and the transfer under one `&mut`
//!   borrow, so two transactions can never both pass against the same nonce.
//! - Fees are burned: debited from the sender and credited to nobody.
//! - Rewards are signed by the credited player and carry an id, so every
//!   peer can credit the same [`SignedReward`] exactly once.

mod error;
mod journal;
mod ledger;
mod tx;
mod validator;

pub use error::{LedgerError, Result, TxRejection};
pub use journal::{LedgerEntry, Reward, SignedReward};
pub use ledger::Ledger;
pub use tx::{SignedTx, Tx, TxDraft, TxType};
pub use validator::TxValidator;
