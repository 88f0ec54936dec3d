//! Ledger errors.

use hegemon_core::Address;

/// Reason a signed transaction was refused admission.
///
/// The display strings are part of the protocol surface reported back to the
/// command's caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxRejection {
    /// Signature, id or signer binding does not check out.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Sender cannot cover amount plus fee.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Replayed or out-of-order transaction.
    #[error("Invalid nonce: expected {expected}, got {got}")]
    InvalidNonce {
        /// Next nonce the ledger accepts from the sender
        expected: u64,
        /// Nonce the transaction carried
        got: u64,
    },

    /// Zero-amount transfer.
    #[error("Amount must be positive")]
    NonPositiveAmount,
}

/// Ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// A transaction failed admission.
    #[error(transparent)]
    Rejected(#[from] TxRejection),

    /// A debit outside transaction admission would go negative.
    #[error("Insufficient balance: {address} holds {balance}, needs {requested}")]
    InsufficientBalance {
        /// Debited account
        address: Address,
        /// Its current balance
        balance: u64,
        /// Amount asked for
        requested: u64,
    },

    /// The reward id is already in the journal.
    #[error("reward {0} was already credited")]
    DuplicateReward(String),

    /// Credit would exceed `u64::MAX`.
    #[error("balance overflow for {0}")]
    BalanceOverflow(Address),

    /// Serializing for hashing or signing failed.
    #[error("transaction encoding failed: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Ledger result.
pub type Result<T> = std::result::Result<T, LedgerError>;
