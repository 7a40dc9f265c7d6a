use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::RwLock;

use tracing::debug;
use vstage_digest::{digest_reader, Algorithm, DigestSet};
use vstage_types::{validate_logical_path, ObjectId, VersionNum};

use crate::commit::{CommitDescriptor, CommitReceipt};
use crate::error::{StoreError, StoreResult};
use crate::snapshot::ObjectSnapshot;
use crate::traits::ObjectStore;

/// One object held by [`InMemoryObjectStore`].
#[derive(Clone, Debug)]
struct StoredObject {
    algorithm: Algorithm,
    /// States by version; index 0 is `v1`.
    versions: Vec<BTreeMap<String, String>>,
    content: HashMap<String, Vec<u8>>,
    fixity: HashMap<String, DigestSet>,
}

impl StoredObject {
    fn head(&self) -> StoreResult<VersionNum> {
        Ok(VersionNum::new(self.versions.len() as u32)?)
    }
}

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Objects live behind a `RwLock`; a commit
/// pulls and verifies all missing content before taking the write lock, so
/// a failed commit leaves the store untouched.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl InMemoryObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Content bytes stored for `digest` in object `id`.
    pub fn content(&self, id: &ObjectId, digest: &str) -> Option<Vec<u8>> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(id)?.content.get(digest).cloned()
    }

    /// Fixity recorded for `digest` in object `id`.
    pub fn fixity(&self, id: &ObjectId, digest: &str) -> Option<DigestSet> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(id)?.fixity.get(digest).cloned()
    }

    /// The state of a specific version.
    pub fn state(&self, id: &ObjectId, version: VersionNum) -> Option<BTreeMap<String, String>> {
        let map = self.objects.read().expect("lock poisoned");
        let index = version.num() as usize - 1;
        map.get(id)?.versions.get(index).cloned()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn snapshot(&self, id: &ObjectId) -> StoreResult<Option<ObjectSnapshot>> {
        let map = self.objects.read().expect("lock poisoned");
        let Some(obj) = map.get(id) else {
            return Ok(None);
        };
        Ok(Some(ObjectSnapshot {
            id: id.clone(),
            head: obj.head()?,
            algorithm: obj.algorithm,
            state: obj.versions.last().cloned().unwrap_or_default(),
            manifest: obj.content.keys().cloned().collect(),
        }))
    }

    fn commit(&self, descriptor: &CommitDescriptor) -> StoreResult<CommitReceipt> {
        let id = &descriptor.object_id;
        for path in descriptor.state.keys() {
            validate_logical_path(path)?;
        }

        let (expected, held) = {
            let map = self.objects.read().expect("lock poisoned");
            match map.get(id) {
                Some(obj) => {
                    if obj.algorithm != descriptor.algorithm {
                        return Err(StoreError::AlgorithmMismatch {
                            expected: obj.algorithm,
                            found: descriptor.algorithm,
                        });
                    }
                    let held: Vec<String> = obj.content.keys().cloned().collect();
                    (obj.head()?.next()?, held)
                }
                None => (VersionNum::FIRST, Vec::new()),
            }
        };
        if descriptor.version != expected {
            return Err(StoreError::VersionConflict {
                id: id.clone(),
                expected,
                found: descriptor.version,
            });
        }

        // Pull only what the object does not already hold.
        let mut pulled: HashMap<String, Vec<u8>> = HashMap::new();
        let mut fixity: HashMap<String, DigestSet> = HashMap::new();
        for digest in descriptor.state.values() {
            if held.contains(digest) || pulled.contains_key(digest) {
                continue;
            }
            let mut content = descriptor
                .get_content(digest)?
                .ok_or_else(|| StoreError::MissingContent(digest.clone()))?;
            let mut bytes = Vec::new();
            content.reader.read_to_end(&mut bytes)?;
            let (computed, _) = digest_reader(&mut bytes.as_slice(), &[descriptor.algorithm])?;
            let (computed, _) = computed
                .split(descriptor.algorithm)
                .map_err(|e| StoreError::InvalidState(e.to_string()))?;
            if computed != *digest {
                return Err(StoreError::HashMismatch {
                    expected: digest.clone(),
                    computed,
                });
            }
            debug!(digest = %digest, source = %content.source_name, "content pulled");
            let values = descriptor.get_fixity(digest);
            if !values.is_empty() {
                fixity.insert(digest.clone(), values);
            }
            pulled.insert(digest.clone(), bytes);
        }

        let mut map = self.objects.write().expect("lock poisoned");
        let current_head = match map.get(id) {
            Some(obj) => Some(obj.head()?),
            None => None,
        };
        let still_expected = match current_head {
            Some(head) => head.next()?,
            None => VersionNum::FIRST,
        };
        if still_expected != descriptor.version {
            return Err(StoreError::VersionConflict {
                id: id.clone(),
                expected: still_expected,
                found: descriptor.version,
            });
        }

        let count = pulled.len();
        let obj = map.entry(id.clone()).or_insert_with(|| StoredObject {
            algorithm: descriptor.algorithm,
            versions: Vec::new(),
            content: HashMap::new(),
            fixity: HashMap::new(),
        });
        obj.content.extend(pulled);
        obj.fixity.extend(fixity);
        obj.versions.push(descriptor.state.clone());
        debug!(object = %id, version = %descriptor.version, pulled = count, "commit stored");

        Ok(CommitReceipt {
            object_id: id.clone(),
            version: descriptor.version,
            pulled: count,
        })
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}
