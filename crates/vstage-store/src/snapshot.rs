use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use vstage_digest::Algorithm;
use vstage_types::{ObjectId, VersionNum};

/// A store's description of an object's head version.
///
/// This is the baseline a stage starts from when its target object already
/// exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// The object.
    pub id: ObjectId,
    /// The most recent version.
    pub head: VersionNum,
    /// The object's primary digest algorithm.
    pub algorithm: Algorithm,
    /// Logical path to primary digest in the head version.
    pub state: BTreeMap<String, String>,
    /// Every digest the store holds content for.
    pub manifest: BTreeSet<String>,
}
