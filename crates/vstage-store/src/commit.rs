use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use vstage_digest::{Algorithm, DigestSet};
use vstage_types::{ObjectId, VersionNum};

use crate::error::StoreResult;
use crate::traits::ContentSource;

/// An open byte source for one piece of content.
pub struct ContentRef {
    /// Human-readable origin of the bytes (usually a local file path).
    pub source_name: String,
    /// The bytes. Nothing is read until the store reads from it.
    pub reader: Box<dyn Read + Send>,
}

impl ContentRef {
    pub fn new(source_name: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
        Self {
            source_name: source_name.into(),
            reader,
        }
    }
}

impl fmt::Debug for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentRef")
            .field("source_name", &self.source_name)
            .finish_non_exhaustive()
    }
}

/// The hand-off from a validated stage to an object store.
///
/// Building a descriptor copies no bytes. The store pulls content through
/// [`get_content`](Self::get_content) for the digests it lacks.
#[derive(Clone)]
pub struct CommitDescriptor {
    /// Target object.
    pub object_id: ObjectId,
    /// The version the commit creates.
    pub version: VersionNum,
    /// Primary digest algorithm of every value in `state`.
    pub algorithm: Algorithm,
    /// Logical path to primary digest for the new version.
    pub state: BTreeMap<String, String>,
    source: Arc<dyn ContentSource>,
}

impl CommitDescriptor {
    pub fn new(
        object_id: ObjectId,
        version: VersionNum,
        algorithm: Algorithm,
        state: BTreeMap<String, String>,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            object_id,
            version,
            algorithm,
            state,
            source,
        }
    }

    /// Open the staged content for `digest`.
    pub fn get_content(&self, digest: &str) -> StoreResult<Option<ContentRef>> {
        self.source.get_content(digest)
    }

    /// Fixity values recorded for `digest`.
    pub fn get_fixity(&self, digest: &str) -> DigestSet {
        self.source.get_fixity(digest)
    }
}

impl fmt::Debug for CommitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitDescriptor")
            .field("object_id", &self.object_id)
            .field("version", &self.version)
            .field("algorithm", &self.algorithm)
            .field("state", &self.state.len())
            .finish_non_exhaustive()
    }
}

/// What a store reports after accepting a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    pub object_id: ObjectId,
    pub version: VersionNum,
    /// Number of digests whose content was pulled from the source.
    pub pulled: usize,
}
