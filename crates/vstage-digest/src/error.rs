use crate::algorithm::Algorithm;

/// Errors from digest operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DigestError {
    /// The algorithm id is not in the registry.
    #[error("unknown digest algorithm: {0:?}")]
    AlgorithmUnknown(String),

    /// A digest set has no value for a required algorithm.
    #[error("digest set has no {0} value")]
    MissingDigest(Algorithm),
}
