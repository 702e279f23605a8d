//! Error types for graph store operations.

use lens_types::ErrorKind;

/// Errors that can occur while reading from or committing to a graph store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key read by the transaction changed before commit.
    ///
    /// Retryable: the executor re-runs the whole transaction.
    #[error("write conflict on key {key}")]
    Conflict {
        /// The first key found to have moved.
        key: String,
    },

    /// The transaction kept conflicting until the retry budget ran out.
    #[error("transaction {name} gave up after {attempts} conflicting attempts")]
    ConflictExhausted {
        /// Name of the transaction.
        name: &'static str,
        /// Attempts made.
        attempts: u32,
    },

    /// A stored record could not be interpreted.
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// An error from the Fjall storage engine.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

impl StoreError {
    /// Whether re-running the transaction may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConflictExhausted { .. } => ErrorKind::ConflictExhausted,
            _ => ErrorKind::Storage,
        }
    }
}
