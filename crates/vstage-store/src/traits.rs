use vstage_digest::DigestSet;
use vstage_types::ObjectId;

use crate::commit::{CommitDescriptor, CommitReceipt, ContentRef};
use crate::error::StoreResult;
use crate::snapshot::ObjectSnapshot;

/// Pull-based access to content that is not yet in a store.
///
/// A store calls these during its own write phase, only for digests it
/// does not already hold.
pub trait ContentSource: Send + Sync {
    /// Open the content for `digest`.
    ///
    /// Returns `Ok(None)` if the source has no content for the digest.
    fn get_content(&self, digest: &str) -> StoreResult<Option<ContentRef>>;

    /// Fixity values recorded for `digest` (empty if none).
    fn get_fixity(&self, digest: &str) -> DigestSet;
}

/// A versioned-object store that accepts commits.
///
/// Implementations own the durable write, version creation, and any
/// crash-revert behavior. A commit either creates exactly the version named
/// in the descriptor or fails without creating it.
pub trait ObjectStore: Send + Sync {
    /// Describe the head version of an object.
    ///
    /// Returns `Ok(None)` if the object does not exist yet.
    fn snapshot(&self, id: &ObjectId) -> StoreResult<Option<ObjectSnapshot>>;

    /// Create a new object version from `descriptor`.
    fn commit(&self, descriptor: &CommitDescriptor) -> StoreResult<CommitReceipt>;
}
