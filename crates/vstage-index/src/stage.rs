//! The stage: a content-addressed change-set for one object.
//!
//! A [`Stage`] holds the complete logical state the next version of an
//! object should have (`next_state`), the digests the object already stores
//! (`existing`), and a local file for every other digest (`local_content`).
//! Adding content only ever digests files; nothing is copied until commit.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use vstage_digest::{Algorithm, DigestSet};
use vstage_store::ObjectSnapshot;
use vstage_types::{
    ancestors, is_root, is_under, join_logical, validate_logical_dir, validate_logical_path,
    ObjectId, VersionNum,
};

use crate::entry::LocalFileRef;
use crate::error::{StageError, StageResult};
use crate::observer::{StageEvent, StageObserver, TracingObserver};
use crate::status::{diff_states, StateDiff};
use crate::walk::{digest_file, walk_digests, CancelToken, DigestWalk, WalkOptions};

/// What a merge did to a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Updated,
    /// The path already had this digest; nothing changed.
    Unchanged,
}

/// Options for [`Stage::add_tree`].
#[derive(Clone, Debug, Default)]
pub struct AddTreeOptions {
    /// Stage entries whose name starts with `.`.
    pub include_hidden: bool,
    /// Remove staged paths under the prefix that no longer exist locally.
    pub sync_remove: bool,
    /// Digest workers. Zero means one per CPU.
    pub concurrency: usize,
    pub cancel: Option<CancelToken>,
}

/// Counts reported by [`Stage::add_tree`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddTreeSummary {
    /// Regular files digested.
    pub files: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Paths dropped by sync removal.
    pub removed: usize,
}

impl AddTreeSummary {
    fn record(&mut self, outcome: MergeOutcome) {
        self.files += 1;
        match outcome {
            MergeOutcome::Added => self.added += 1,
            MergeOutcome::Updated => self.updated += 1,
            MergeOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// A change-set for the next version of one object.
#[derive(Clone)]
pub struct Stage {
    pub(crate) id: ObjectId,
    pub(crate) next_version: VersionNum,
    pub(crate) algorithm: Algorithm,
    pub(crate) fixity_algorithms: Vec<Algorithm>,
    /// Logical path to primary digest.
    pub(crate) next_state: BTreeMap<String, String>,
    /// Digests the object already stores.
    pub(crate) existing: BTreeSet<String>,
    /// Primary digest to the local file that will supply it.
    pub(crate) local_content: BTreeMap<String, LocalFileRef>,
    /// Primary digest to its fixity values.
    pub(crate) fixity: BTreeMap<String, DigestSet>,
    pub(crate) observer: Arc<dyn StageObserver>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("next_version", &self.next_version)
            .field("algorithm", &self.algorithm)
            .field("fixity_algorithms", &self.fixity_algorithms)
            .field("next_state", &self.next_state.len())
            .field("existing", &self.existing.len())
            .field("local_content", &self.local_content.len())
            .finish()
    }
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.next_version == other.next_version
            && self.algorithm == other.algorithm
            && self.fixity_algorithms == other.fixity_algorithms
            && self.next_state == other.next_state
            && self.existing == other.existing
            && self.local_content == other.local_content
            && self.fixity == other.fixity
    }
}

impl Eq for Stage {}

impl Stage {
    /// Create a stage for `id`.
    ///
    /// Without a baseline the stage targets `v1` of a new object using
    /// `algorithm`. With one, it starts from the baseline's head state, targets
    /// the following version, and uses the baseline's algorithm; `algorithm`
    /// is then ignored. Fixity algorithms equal to the primary are dropped.
    pub fn new(
        id: ObjectId,
        baseline: Option<&ObjectSnapshot>,
        algorithm: Algorithm,
        fixity: &[Algorithm],
    ) -> StageResult<Self> {
        let mut stage = Self {
            id,
            next_version: VersionNum::FIRST,
            algorithm,
            fixity_algorithms: Vec::new(),
            next_state: BTreeMap::new(),
            existing: BTreeSet::new(),
            local_content: BTreeMap::new(),
            fixity: BTreeMap::new(),
            observer: Arc::new(TracingObserver),
        };
        if let Some(snapshot) = baseline {
            if snapshot.id != stage.id {
                return Err(StageError::BaselineMismatch {
                    expected: stage.id,
                    found: snapshot.id.clone(),
                });
            }
            stage.algorithm = snapshot.algorithm;
            stage.next_version = snapshot.head.next()?;
            stage.next_state = snapshot.state.clone();
            stage.existing = snapshot.manifest.clone();
        }
        stage.fixity_algorithms = fixity_without(stage.algorithm, fixity);
        debug!(
            object = %stage.id,
            version = %stage.next_version,
            algorithm = %stage.algorithm,
            "stage created"
        );
        Ok(stage)
    }

    /// Replace the observer that receives change events.
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn set_observer(&mut self, observer: Arc<dyn StageObserver>) {
        self.observer = observer;
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn next_version(&self) -> VersionNum {
        self.next_version
    }

    /// The primary digest algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn fixity_algorithms(&self) -> &[Algorithm] {
        &self.fixity_algorithms
    }

    /// Primary algorithm followed by the fixity algorithms.
    pub fn algorithms(&self) -> Vec<Algorithm> {
        let mut algs = Vec::with_capacity(1 + self.fixity_algorithms.len());
        algs.push(self.algorithm);
        algs.extend(self.fixity_algorithms.iter().copied());
        algs
    }

    pub fn next_state(&self) -> &BTreeMap<String, String> {
        &self.next_state
    }

    pub fn existing(&self) -> &BTreeSet<String> {
        &self.existing
    }

    pub fn local_content(&self) -> &BTreeMap<String, LocalFileRef> {
        &self.local_content
    }

    pub fn fixity(&self) -> &BTreeMap<String, DigestSet> {
        &self.fixity
    }

    /// The staged digest for `path`.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.next_state.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.next_state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next_state.is_empty()
    }

    /// Staged `(path, digest)` pairs in path order.
    pub fn list(&self) -> impl Iterator<Item = (&str, &str)> {
        self.next_state
            .iter()
            .map(|(path, digest)| (path.as_str(), digest.as_str()))
    }

    /// Path-level changes from `base` to this stage's next state.
    pub fn diff_against(&self, base: &BTreeMap<String, String>) -> StateDiff {
        diff_states(base, &self.next_state)
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Stage a single local file.
    ///
    /// The logical name defaults to the file's base name. Symbolic links
    /// are rejected as unsupported.
    pub fn add_file(&mut self, local_path: &Path, logical_name: Option<&str>) -> StageResult<MergeOutcome> {
        let path = std::path::absolute(local_path).map_err(StageError::io(local_path))?;
        let name = match logical_name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .and_then(OsStr::to_str)
                .ok_or_else(|| StageError::InvalidLogicalPath(path.display().to_string()))?
                .to_string(),
        };
        validate_logical_path(&name)?;

        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StageError::SourceMissing(path));
            }
            Err(err) => return Err(StageError::Io { path, source: err }),
        };
        if !meta.is_file() {
            return Err(StageError::UnsupportedFileType(path));
        }

        let (digests, local) =
            digest_file(&path, &self.algorithms()).map_err(StageError::io(&path))?;
        self.merge(&name, local, digests, &BTreeSet::new())
    }

    /// Stage every regular file under `local_root` beneath `logical_prefix`.
    ///
    /// Files are digested concurrently and merged one at a time as results
    /// arrive. With `sync_remove`, staged paths under the prefix whose local
    /// counterpart is gone (or is no longer a regular file) are removed after
    /// all merges; such paths never block a merge with a path conflict.
    ///
    /// On cancellation or the first hard error, merges already applied stay
    /// applied and the error is returned. With `sync_remove`, stale paths not
    /// re-observed are still removed on that error path before returning.
    pub fn add_tree(
        &mut self,
        local_root: &Path,
        logical_prefix: &str,
        options: &AddTreeOptions,
    ) -> StageResult<AddTreeSummary> {
        validate_logical_dir(logical_prefix)?;
        let root = std::path::absolute(local_root).map_err(StageError::io(local_root))?;
        match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(StageError::UnsupportedFileType(root)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StageError::SourceMissing(root));
            }
            Err(err) => return Err(StageError::Io { path: root, source: err }),
        }

        let stale = if options.sync_remove {
            self.stale_paths(&root, logical_prefix)?
        } else {
            BTreeSet::new()
        };

        let walk = walk_digests(
            &root,
            &self.algorithms(),
            &WalkOptions {
                include_hidden: options.include_hidden,
                concurrency: options.concurrency,
                cancel: options.cancel.clone(),
            },
        )?;
        let mut summary = AddTreeSummary::default();
        let mut observed = HashSet::new();
        let merged = self.merge_walk(walk, logical_prefix, &stale, &mut summary, &mut observed);

        if options.sync_remove {
            summary.removed = self.remove_stale(&stale, &observed);
        }
        merged?;

        info!(
            root = %root.display(),
            prefix = logical_prefix,
            files = summary.files,
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "tree staged"
        );
        Ok(summary)
    }

    /// Remove a path, or with `recursive` everything beneath a directory.
    ///
    /// The root (`.`) removes everything when recursive and nothing
    /// otherwise. Absent paths are a no-op. Returns the number of paths
    /// removed.
    pub fn remove(&mut self, logical_path: &str, recursive: bool) -> StageResult<usize> {
        let target = logical_path.trim_end_matches('/');
        let doomed: Vec<String> = if is_root(target) {
            if !recursive {
                return Ok(0);
            }
            self.next_state.keys().cloned().collect()
        } else {
            validate_logical_path(target)?;
            self.next_state
                .keys()
                .filter(|key| key.as_str() == target || (recursive && is_under(key, target)))
                .cloned()
                .collect()
        };
        for path in &doomed {
            self.next_state.remove(path);
            self.notify(StageEvent::Removed { path: path.clone() });
        }
        if !doomed.is_empty() {
            self.prune_content();
        }
        Ok(doomed.len())
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    /// Merge one digested file into the next state.
    ///
    /// Paths in `ignore` are about to be removed and do not count as
    /// conflicts.
    pub(crate) fn merge(
        &mut self,
        logical: &str,
        local: LocalFileRef,
        digests: DigestSet,
        ignore: &BTreeSet<String>,
    ) -> StageResult<MergeOutcome> {
        let (digest, fixity) = digests.split(self.algorithm)?;
        let outcome = match self.next_state.get(logical) {
            None => MergeOutcome::Added,
            Some(prev) if *prev == digest => return Ok(MergeOutcome::Unchanged),
            Some(_) => MergeOutcome::Updated,
        };
        if let Some(conflict) = self.find_conflict(logical, ignore) {
            return Err(StageError::PathConflict {
                path: logical.to_string(),
                conflict,
            });
        }

        let replaced = self.next_state.insert(logical.to_string(), digest.clone());
        if let Some(old) = replaced {
            self.drop_if_unreferenced(&old);
        }
        if !fixity.is_empty() {
            self.fixity.insert(digest.clone(), fixity);
        }
        if !self.existing.contains(&digest) && !self.local_content.contains_key(&digest) {
            self.local_content.insert(digest.clone(), local);
        }
        let path = logical.to_string();
        self.notify(match outcome {
            MergeOutcome::Updated => StageEvent::Updated { path, digest },
            _ => StageEvent::Added { path, digest },
        });
        Ok(outcome)
    }

    /// A staged path that is an ancestor or descendant of `logical`.
    fn find_conflict(&self, logical: &str, ignore: &BTreeSet<String>) -> Option<String> {
        if let Some(ancestor) = ancestors(logical)
            .find(|dir| self.next_state.contains_key(*dir) && !ignore.contains(*dir))
        {
            return Some(ancestor.to_string());
        }
        let dir = format!("{logical}/");
        self.next_state
            .range::<str, _>((Bound::Included(dir.as_str()), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&dir))
            .find(|key| !ignore.contains(*key))
            .cloned()
    }

    fn merge_walk(
        &mut self,
        walk: DigestWalk,
        prefix: &str,
        stale: &BTreeSet<String>,
        summary: &mut AddTreeSummary,
        observed: &mut HashSet<String>,
    ) -> StageResult<()> {
        for result in walk {
            let file = result?;
            let logical = join_logical(prefix, &file.path);
            validate_logical_path(&logical)?;
            let outcome = self.merge(&logical, file.local, file.digests, stale)?;
            summary.record(outcome);
            observed.insert(logical);
        }
        Ok(())
    }

    /// Staged paths under `prefix` whose local file is gone or no longer regular.
    ///
    /// Only stats files; any error other than absence aborts before the stage
    /// is touched.
    fn stale_paths(&self, root: &Path, prefix: &str) -> StageResult<BTreeSet<String>> {
        let mut stale = BTreeSet::new();
        for key in self.next_state.keys() {
            let rel = if is_root(prefix) {
                key.as_str()
            } else if is_under(key, prefix) {
                &key[prefix.len() + 1..]
            } else {
                continue;
            };
            let local: PathBuf = rel.split('/').fold(root.to_path_buf(), |p, seg| p.join(seg));
            // Symlinks in every segment but the last are followed. A file
            // under a directory that is now a symlink stays staged, although
            // the walk never visits it again.
            match fs::symlink_metadata(&local) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    stale.insert(key.clone());
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                    ) =>
                {
                    stale.insert(key.clone());
                }
                Err(err) => return Err(StageError::Io { path: local, source: err }),
            }
        }
        Ok(stale)
    }

    fn remove_stale(&mut self, stale: &BTreeSet<String>, observed: &HashSet<String>) -> usize {
        let mut removed = 0;
        for path in stale.iter().filter(|path| !observed.contains(*path)) {
            if self.next_state.remove(path).is_some() {
                self.notify(StageEvent::Removed { path: path.clone() });
                removed += 1;
            }
        }
        if removed > 0 {
            self.prune_content();
        }
        removed
    }

    /// Drop local content and fixity no longer referenced by the next state.
    fn prune_content(&mut self) {
        let referenced: HashSet<&String> = self.next_state.values().collect();
        self.local_content
            .retain(|digest, _| referenced.contains(digest));
        self.fixity.retain(|digest, _| referenced.contains(digest));
    }

    /// Forget the local file and fixity of `digest` once no path holds it.
    fn drop_if_unreferenced(&mut self, digest: &str) {
        if self.next_state.values().all(|held| held != digest) {
            self.local_content.remove(digest);
            self.fixity.remove(digest);
        }
    }

    fn notify(&self, event: StageEvent) {
        self.observer.on_event(&event);
    }
}

fn fixity_without(primary: Algorithm, fixity: &[Algorithm]) -> Vec<Algorithm> {
    let mut algs: Vec<Algorithm> = Vec::with_capacity(fixity.len());
    for &alg in fixity {
        if alg != primary && !algs.contains(&alg) {
            algs.push(alg);
        }
    }
    algs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::observer::NoopObserver;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StageEvent>>);

    impl StageObserver for Recorder {
        fn on_event(&self, event: &StageEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    impl Recorder {
        fn events(&self) -> Vec<StageEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    fn make_stage() -> Stage {
        Stage::new(ObjectId::new("obj").unwrap(), None, Algorithm::Sha256, &[])
            .unwrap()
            .with_observer(Arc::new(NoopObserver))
    }

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn sync() -> AddTreeOptions {
        AddTreeOptions {
            sync_remove: true,
            ..AddTreeOptions::default()
        }
    }

    fn paths(stage: &Stage) -> Vec<&str> {
        stage.list().map(|(path, _)| path).collect()
    }

    #[test]
    fn new_stage_is_empty() {
        let stage = make_stage();
        assert!(stage.is_empty());
        assert_eq!(stage.next_version(), VersionNum::FIRST);
        assert_eq!(stage.algorithms(), vec![Algorithm::Sha256]);
    }

    #[test]
    fn baseline_sets_version_algorithm_and_state() {
        let id = ObjectId::new("obj").unwrap();
        let snapshot = ObjectSnapshot {
            id: id.clone(),
            head: VersionNum::new(2).unwrap(),
            algorithm: Algorithm::Sha256,
            state: BTreeMap::from([("a.txt".to_string(), HELLO_SHA256.to_string())]),
            manifest: BTreeSet::from([HELLO_SHA256.to_string()]),
        };
        let stage = Stage::new(id, Some(&snapshot), Algorithm::Sha512, &[Algorithm::Sha256])
            .unwrap();
        assert_eq!(stage.next_version(), VersionNum::new(3).unwrap());
        assert_eq!(stage.algorithm(), Algorithm::Sha256);
        assert!(stage.fixity_algorithms().is_empty());
        assert_eq!(stage.get("a.txt"), Some(HELLO_SHA256));
        assert!(stage.existing().contains(HELLO_SHA256));
    }

    #[test]
    fn baseline_for_other_object_rejected() {
        let snapshot = ObjectSnapshot {
            id: ObjectId::new("other").unwrap(),
            head: VersionNum::FIRST,
            algorithm: Algorithm::Sha256,
            state: BTreeMap::new(),
            manifest: BTreeSet::new(),
        };
        let result = Stage::new(ObjectId::new("obj").unwrap(), Some(&snapshot), Algorithm::Sha256, &[]);
        assert!(matches!(result, Err(StageError::BaselineMismatch { .. })));
    }

    #[test]
    fn add_file_stages_hello() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "hello.txt", "hello");
        let mut stage = make_stage();

        let outcome = stage.add_file(&path, None).unwrap();
        assert_eq!(outcome, MergeOutcome::Added);
        assert_eq!(stage.get("hello.txt"), Some(HELLO_SHA256));
        let local = &stage.local_content()[HELLO_SHA256];
        assert_eq!(local.size, 5);
        assert_eq!(local.path, path);
    }

    #[test]
    fn add_file_with_explicit_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "hello.txt", "hello");
        let mut stage = make_stage();
        stage.add_file(&path, Some("docs/greeting.txt")).unwrap();
        assert_eq!(paths(&stage), vec!["docs/greeting.txt"]);
    }

    #[test]
    fn add_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "hello.txt", "hello");
        let mut stage = make_stage();

        let result = stage.add_file(&path, Some("../escape"));
        assert!(matches!(result, Err(StageError::InvalidLogicalPath(_))));
        let result = stage.add_file(&dir.path().join("missing"), None);
        assert!(matches!(result, Err(StageError::SourceMissing(_))));
        let result = stage.add_file(dir.path(), Some("dir"));
        assert!(matches!(result, Err(StageError::UnsupportedFileType(_))));
        assert!(stage.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn add_file_rejects_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = write(dir.path(), "hello.txt", "hello");
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let mut stage = make_stage();
        let result = stage.add_file(&link, None);
        assert!(matches!(result, Err(StageError::UnsupportedFileType(_))));
    }

    #[test]
    fn readding_same_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "hello.txt", "hello");
        let mut stage = make_stage();
        stage.add_file(&path, None).unwrap();
        let before = stage.clone();

        let outcome = stage.add_file(&path, None).unwrap();
        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(stage, before);
    }

    #[test]
    fn identical_content_shares_one_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "a.txt", "hello");
        let second = write(dir.path(), "b.txt", "hello");
        let mut stage = make_stage();
        stage.add_file(&first, None).unwrap();
        stage.add_file(&second, None).unwrap();

        assert_eq!(stage.len(), 2);
        assert_eq!(stage.local_content().len(), 1);
        assert_eq!(stage.local_content()[HELLO_SHA256].path, first);
    }

    #[test]
    fn stored_digest_needs_no_local_file() {
        let id = ObjectId::new("obj").unwrap();
        let snapshot = ObjectSnapshot {
            id: id.clone(),
            head: VersionNum::FIRST,
            algorithm: Algorithm::Sha256,
            state: BTreeMap::from([("old.txt".to_string(), HELLO_SHA256.to_string())]),
            manifest: BTreeSet::from([HELLO_SHA256.to_string()]),
        };
        let mut stage = Stage::new(id, Some(&snapshot), Algorithm::Sha256, &[])
            .unwrap()
            .with_observer(Arc::new(NoopObserver));
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "new.txt", "hello");

        stage.add_file(&path, None).unwrap();
        assert_eq!(stage.get("new.txt"), Some(HELLO_SHA256));
        assert!(stage.local_content().is_empty());
    }

    #[test]
    fn conflicting_paths_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "hello.txt", "hello");
        let mut stage = make_stage();
        stage.add_file(&path, Some("a/b")).unwrap();
        let before = stage.clone();

        match stage.add_file(&path, Some("a")) {
            Err(StageError::PathConflict { path, conflict }) => {
                assert_eq!(path, "a");
                assert_eq!(conflict, "a/b");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        match stage.add_file(&path, Some("a/b/c")) {
            Err(StageError::PathConflict { conflict, .. }) => assert_eq!(conflict, "a/b"),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(stage, before);

        // Sibling names sharing a string prefix are not conflicts.
        stage.add_file(&path, Some("a/bc")).unwrap();
        stage.add_file(&path, Some("a/b.txt")).unwrap();
        assert_eq!(stage.len(), 3);
    }

    #[test]
    fn fixity_recorded_per_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "hello.txt", "hello");
        let mut stage = Stage::new(
            ObjectId::new("obj").unwrap(),
            None,
            Algorithm::Sha256,
            &[Algorithm::Md5, Algorithm::Sha256, Algorithm::Md5],
        )
        .unwrap()
        .with_observer(Arc::new(NoopObserver));
        assert_eq!(stage.fixity_algorithms(), &[Algorithm::Md5]);

        stage.add_file(&path, None).unwrap();
        let fixity = &stage.fixity()[HELLO_SHA256];
        assert_eq!(fixity.get(Algorithm::Md5), Some(HELLO_MD5));
        assert_eq!(fixity.len(), 1);
    }

    #[test]
    fn observer_sees_add_update_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "f.txt", "one");
        let recorder = Arc::new(Recorder::default());
        let mut stage = make_stage().with_observer(recorder.clone());

        stage.add_file(&path, None).unwrap();
        stage.add_file(&path, None).unwrap();
        fs::write(&path, "two").unwrap();
        stage.add_file(&path, None).unwrap();
        stage.remove("f.txt", false).unwrap();

        let events = recorder.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], StageEvent::Added { .. }));
        assert!(matches!(events[1], StageEvent::Updated { .. }));
        assert_eq!(events[2], StageEvent::Removed { path: "f.txt".into() });
    }

    #[test]
    fn add_tree_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "hello");
        write(dir.path(), "sub/b.txt", "bee");
        write(dir.path(), ".hidden", "secret");
        let mut stage = make_stage();

        let summary = stage
            .add_tree(dir.path(), "data", &AddTreeOptions::default())
            .unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.added, 2);
        assert_eq!(paths(&stage), vec!["data/a.txt", "data/sub/b.txt"]);
        assert_eq!(stage.local_content().len(), 2);

        let again = stage
            .add_tree(dir.path(), "data", &AddTreeOptions::default())
            .unwrap();
        assert_eq!(again.unchanged, 2);
        assert_eq!(again.added, 0);
    }

    #[test]
    fn add_tree_hidden_on_request() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".hidden", "secret");
        let mut stage = make_stage();
        let options = AddTreeOptions {
            include_hidden: true,
            ..AddTreeOptions::default()
        };
        stage.add_tree(dir.path(), ".", &options).unwrap();
        assert_eq!(paths(&stage), vec![".hidden"]);
    }

    #[test]
    fn sync_removes_deleted_files_and_prunes_content() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.txt", "keep");
        let gone = write(dir.path(), "gone.txt", "gone");
        let mut stage = make_stage();
        stage.add_tree(dir.path(), ".", &AddTreeOptions::default()).unwrap();
        assert_eq!(stage.local_content().len(), 2);

        fs::remove_file(&gone).unwrap();
        let mut plain = stage.clone();
        plain.add_tree(dir.path(), ".", &AddTreeOptions::default()).unwrap();
        assert_eq!(plain.len(), 2);

        let summary = stage.add_tree(dir.path(), ".", &sync()).unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(paths(&stage), vec!["keep.txt"]);
        assert_eq!(stage.local_content().len(), 1);
    }

    #[test]
    fn sync_only_touches_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        let outside = write(other.path(), "b.txt", "b");
        let mut stage = make_stage();
        stage.add_file(&outside, Some("elsewhere/b.txt")).unwrap();
        stage.add_tree(dir.path(), "data", &AddTreeOptions::default()).unwrap();

        fs::remove_file(dir.path().join("a.txt")).unwrap();
        stage.add_tree(dir.path(), "data", &sync()).unwrap();
        assert_eq!(paths(&stage), vec!["elsewhere/b.txt"]);
    }

    #[test]
    fn sync_allows_file_replaced_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "x", "file");
        let mut stage = make_stage();
        stage.add_tree(dir.path(), ".", &AddTreeOptions::default()).unwrap();

        fs::remove_file(dir.path().join("x")).unwrap();
        write(dir.path(), "x/y", "nested");

        let mut plain = stage.clone();
        let result = plain.add_tree(dir.path(), ".", &AddTreeOptions::default());
        assert!(matches!(result, Err(StageError::PathConflict { .. })));

        stage.add_tree(dir.path(), ".", &sync()).unwrap();
        assert_eq!(paths(&stage), vec!["x/y"]);
    }

    #[test]
    fn add_tree_missing_root_leaves_stage_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = make_stage();
        let result = stage.add_tree(&dir.path().join("nope"), ".", &sync());
        assert!(matches!(result, Err(StageError::SourceMissing(_))));
        assert!(stage.is_empty());
    }

    #[test]
    fn add_tree_rejects_bad_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = make_stage();
        let result = stage.add_tree(dir.path(), "../up", &AddTreeOptions::default());
        assert!(matches!(result, Err(StageError::InvalidLogicalPath(_))));
    }

    #[test]
    fn canceled_add_tree_reports_cancel() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        let token = CancelToken::new();
        token.cancel();
        let options = AddTreeOptions {
            cancel: Some(token),
            ..AddTreeOptions::default()
        };
        let mut stage = make_stage();
        let err = stage.add_tree(dir.path(), ".", &options).unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn remove_exact_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/one.txt", "1");
        write(dir.path(), "a/two.txt", "2");
        write(dir.path(), "ab.txt", "3");
        let mut stage = make_stage();
        stage.add_tree(dir.path(), ".", &AddTreeOptions::default()).unwrap();

        assert_eq!(stage.remove("a", false).unwrap(), 0);
        assert_eq!(stage.remove("missing.txt", false).unwrap(), 0);
        assert_eq!(stage.remove("a", true).unwrap(), 2);
        assert_eq!(paths(&stage), vec!["ab.txt"]);
        assert_eq!(stage.local_content().len(), 1);
        assert!(matches!(
            stage.remove("../ab.txt", false),
            Err(StageError::InvalidLogicalPath(_))
        ));
    }

    #[test]
    fn remove_root() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "b/c.txt", "c");
        let mut stage = make_stage();
        stage.add_tree(dir.path(), ".", &AddTreeOptions::default()).unwrap();

        assert_eq!(stage.remove(".", false).unwrap(), 0);
        assert_eq!(stage.len(), 2);
        assert_eq!(stage.remove(".", true).unwrap(), 2);
        assert!(stage.is_empty());
        assert!(stage.local_content().is_empty());
        assert!(stage.fixity().is_empty());
    }

    #[test]
    fn add_then_remove_restores_stage() {
        let dir = tempfile::tempdir().unwrap();
        let kept = write(dir.path(), "kept.txt", "kept");
        let temp = write(dir.path(), "temp.txt", "temporary");
        let mut stage = Stage::new(ObjectId::new("obj").unwrap(), None, Algorithm::Sha256, &[Algorithm::Md5])
            .unwrap()
            .with_observer(Arc::new(NoopObserver));
        stage.add_file(&kept, None).unwrap();
        let before = stage.clone();

        stage.add_file(&temp, None).unwrap();
        stage.remove("temp.txt", false).unwrap();
        assert_eq!(stage, before);
    }

    #[test]
    fn diff_against_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "hello.txt", "hello");
        let mut stage = make_stage();
        stage.add_file(&path, None).unwrap();
        let diff = stage.diff_against(&BTreeMap::new());
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn updated_file_drops_replaced_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "f.txt", "one");
        let mut stage = Stage::new(ObjectId::new("obj").unwrap(), None, Algorithm::Sha256, &[Algorithm::Md5])
            .unwrap()
            .with_observer(Arc::new(NoopObserver));
        stage.add_file(&path, None).unwrap();

        fs::write(&path, "two!").unwrap();
        assert_eq!(stage.add_file(&path, None).unwrap(), MergeOutcome::Updated);
        assert_eq!(stage.local_content().len(), 1);
        assert_eq!(stage.fixity().len(), 1);
        let digest = &stage.next_state["f.txt"];
        assert!(stage.local_content().contains_key(digest));
        assert!(stage.validate().is_valid());
    }

    #[test]
    fn updated_file_keeps_content_still_shared() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "hello");
        let b = write(dir.path(), "b.txt", "hello");
        let mut stage = make_stage();
        stage.add_file(&a, None).unwrap();
        stage.add_file(&b, None).unwrap();

        fs::write(&b, "bee").unwrap();
        stage.add_file(&b, None).unwrap();
        assert_eq!(stage.local_content().len(), 2);
        assert!(stage.local_content().contains_key(HELLO_SHA256));
        assert!(stage.validate().is_valid());
    }

    #[test]
    fn resync_after_edit_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "one");
        write(dir.path(), "b/c.txt", "same");
        let mut stage = make_stage();
        stage.add_tree(dir.path(), ".", &sync()).unwrap();

        write(dir.path(), "a.txt", "two!");
        let summary = stage.add_tree(dir.path(), ".", &sync()).unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.removed, 0);
        assert_eq!(stage.local_content().len(), 2);
        assert!(stage.validate().is_valid());
    }

    #[test]
    fn add_tree_dedups_and_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "hello");
        write(dir.path(), "b/c.txt", "hello");
        let mut stage = make_stage();
        stage.add_tree(dir.path(), ".", &AddTreeOptions::default()).unwrap();

        assert_eq!(paths(&stage), vec!["a.txt", "b/c.txt"]);
        assert_eq!(stage.local_content().len(), 1);
        assert!(crate::validate::structural_check(&stage).is_empty());

        assert_eq!(stage.remove("b", true).unwrap(), 1);
        assert_eq!(
            stage.next_state,
            BTreeMap::from([("a.txt".to_string(), HELLO_SHA256.to_string())])
        );
        assert!(stage.local_content().contains_key(HELLO_SHA256));
    }

    #[test]
    fn canceled_mid_walk_keeps_earlier_merges() {
        struct CancelOnFirst(CancelToken);

        impl StageObserver for CancelOnFirst {
            fn on_event(&self, _event: &StageEvent) {
                self.0.cancel();
            }
        }

        let dir = tempfile::tempdir().unwrap();
        for i in 0..50 {
            write(dir.path(), &format!("f{i:02}.txt"), &format!("file {i}"));
        }
        let token = CancelToken::new();
        let mut stage = make_stage().with_observer(Arc::new(CancelOnFirst(token.clone())));
        let options = AddTreeOptions {
            concurrency: 1,
            cancel: Some(token),
            ..AddTreeOptions::default()
        };

        let err = stage.add_tree(dir.path(), ".", &options).unwrap_err();
        assert!(err.is_canceled());
        assert!(!stage.is_empty());
        assert!(stage.len() < 50);
        for (path, digest) in stage.list() {
            let local = &stage.local_content()[digest];
            assert_eq!(local.path, dir.path().join(path));
        }
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_fails_add_tree() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = write(dir.path(), "locked.txt", "locked");
        for i in 0..10 {
            write(dir.path(), &format!("f{i}.txt"), &format!("file {i}"));
        }
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::File::open(&locked).is_ok() {
            // Running as root; permissions are not enforced.
            return;
        }

        let mut stage = make_stage();
        let result = stage.add_tree(dir.path(), ".", &AddTreeOptions::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(matches!(
            result,
            Err(StageError::Walk(crate::walk::WalkError::Io { ref path, .. })) if *path == locked
        ));
        assert!(stage.len() < 11);
        assert!(!paths(&stage).contains(&"locked.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn sync_stat_failure_leaves_stage_untouched() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "d/f.txt", "f");
        write(dir.path(), "top.txt", "top");
        let mut stage = make_stage();
        stage.add_tree(dir.path(), ".", &AddTreeOptions::default()).unwrap();

        write(dir.path(), "new.txt", "new");
        let locked = dir.path().join("d");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Running as root; permissions are not enforced.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let before = stage.clone();
        let result = stage.add_tree(dir.path(), ".", &sync());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(StageError::Io { .. })));
        assert_eq!(stage, before);
        assert_eq!(paths(&stage), vec!["d/f.txt", "top.txt"]);
    }
}
