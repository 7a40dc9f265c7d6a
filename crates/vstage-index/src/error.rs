//! Error types for the staging crate.

use std::io;
use std::path::{Path, PathBuf};

use vstage_digest::{Algorithm, DigestError};
use vstage_store::StoreError;
use vstage_types::{ObjectId, TypeError};

use crate::validate::ValidationReport;
use crate::walk::WalkError;

/// Errors that can occur while building, persisting or committing a stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A logical path is empty, absolute-looking, or has `.`/`..`/empty segments.
    #[error("invalid logical path: {0:?}")]
    InvalidLogicalPath(String),

    /// Adding `path` would make it both a file and a directory.
    #[error("can't add {path:?} because of conflict with {conflict:?}")]
    PathConflict { path: String, conflict: String },

    /// The source is neither a regular file nor a directory where one is required.
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFileType(PathBuf),

    /// The local file or directory does not exist.
    #[error("source not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// A digest algorithm id is not in the registry.
    #[error("unknown digest algorithm: {0:?}")]
    AlgorithmUnknown(String),

    /// A digest set lacks the stage's primary algorithm.
    #[error("missing {0} digest")]
    MissingDigest(Algorithm),

    /// A stage record already exists where a new one was to be created.
    #[error("a stage already exists at {}", .0.display())]
    StageAlreadyExists(PathBuf),

    /// No usable stage record at the given location.
    #[error("no active stage at {}: {reason}", path.display())]
    StageNotFound { path: PathBuf, reason: String },

    /// Object ids must be non-empty.
    #[error("invalid object id: {0:?}")]
    InvalidObjectId(String),

    #[error("invalid version number: {0}")]
    InvalidVersion(String),

    /// The baseline snapshot describes a different object.
    #[error("baseline belongs to object {found}, not {expected}")]
    BaselineMismatch { expected: ObjectId, found: ObjectId },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Directory walk failed or was canceled.
    #[error(transparent)]
    Walk(#[from] WalkError),

    /// Pre-commit validation produced findings.
    #[error("stage is not valid ({} finding(s))", .0.len())]
    ValidationFailed(ValidationReport),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The object store rejected the commit.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl StageError {
    /// Returns `true` if the error is a walk cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, StageError::Walk(WalkError::Canceled))
    }

    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> StageError + '_ {
        move |source| StageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<DigestError> for StageError {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::AlgorithmUnknown(id) => StageError::AlgorithmUnknown(id),
            DigestError::MissingDigest(alg) => StageError::MissingDigest(alg),
        }
    }
}

impl From<TypeError> for StageError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidLogicalPath(path) => StageError::InvalidLogicalPath(path),
            TypeError::EmptyObjectId => StageError::InvalidObjectId(String::new()),
            TypeError::InvalidVersion(v) => StageError::InvalidVersion(v),
        }
    }
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        StageError::Serialization(err.to_string())
    }
}

/// Convenience alias for stage results.
pub type StageResult<T> = Result<T, StageError>;
