use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("object id must not be empty")]
    EmptyObjectId,

    #[error("invalid version number: {0}")]
    InvalidVersion(String),

    #[error("invalid logical path: {0:?}")]
    InvalidLogicalPath(String),
}
