//! World document errors.

/// Errors raised by the shared world document.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The CRDT engine refused an operation or a change.
    #[error("automerge: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    /// A loaded snapshot lacks one of the root containers.
    #[error("world document has no `{0}` container")]
    MissingContainer(&'static str),

    /// A stored record is not a JSON string of the expected shape.
    #[error("corrupt record in `{container}`: {reason}")]
    CorruptRecord {
        /// Root container holding the record
        container: &'static str,
        /// Decoder message
        reason: String,
    },

    /// A peer sent a head that is not 32 hex bytes.
    #[error("malformed change hash `{0}`")]
    BadHead(String),

    /// Serializing a record for storage failed.
    #[error("record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result alias for world operations.
pub type Result<T> = std::result::Result<T, WorldError>;
