use vstage_digest::Algorithm;
use vstage_types::{ObjectId, TypeError, VersionNum};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The commit targets a version other than the one after the head.
    #[error("version conflict for {id}: expected {expected}, commit targets {found}")]
    VersionConflict {
        id: ObjectId,
        expected: VersionNum,
        found: VersionNum,
    },

    /// The commit uses a different primary algorithm than the object.
    #[error("digest algorithm mismatch: object uses {expected}, commit uses {found}")]
    AlgorithmMismatch { expected: Algorithm, found: Algorithm },

    /// The content source has nothing for a digest the store needs.
    #[error("no content available for digest {0}")]
    MissingContent(String),

    /// Pulled content does not hash to the digest it was requested for.
    #[error("content for digest {expected} hashed to {computed}")]
    HashMismatch { expected: String, computed: String },

    /// The commit state is malformed.
    #[error("invalid commit state: {0}")]
    InvalidState(String),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// I/O error while pulling content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
