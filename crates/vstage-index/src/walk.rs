//! Concurrent, multi-algorithm directory digesting.
//!
//! [`walk_digests`] starts one feeder thread that walks the tree and N worker
//! threads that digest regular files. Work flows through bounded channels,
//! so memory stays proportional to the worker count no matter how large the
//! tree is. Results are consumed through the [`DigestWalk`] iterator in
//! completion order.
//!
//! The walk stops at the first error: the error is yielded once, in-flight
//! work is drained and every thread is joined before the iterator finishes.
//! Cancelling the caller's [`CancelToken`] ends the walk with a single
//! [`WalkError::Canceled`].

use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;
use vstage_digest::{digest_reader, Algorithm, DigestSet};
use walkdir::{DirEntry, WalkDir};

use crate::entry::LocalFileRef;

/// Errors produced while walking and digesting a tree.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// A file name under the root is not valid UTF-8 and cannot become a logical path.
    #[error("file name is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("walk canceled")]
    Canceled,
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for [`walk_digests`].
#[derive(Clone, Debug, Default)]
pub struct WalkOptions {
    /// Descend into, and digest, entries whose name starts with `.`.
    pub include_hidden: bool,
    /// Worker count. Zero means one per available CPU.
    pub concurrency: usize,
    /// External cancellation.
    pub cancel: Option<CancelToken>,
}

/// One digested regular file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestedFile {
    /// Path relative to the walk root, `/`-separated.
    pub path: String,
    pub local: LocalFileRef,
    pub digests: DigestSet,
}

/// Digest a single file with every algorithm in one read.
///
/// Size and mtime are taken from the open handle before reading, so a write
/// racing the digest shows up as drift later.
pub fn digest_file(path: &Path, algorithms: &[Algorithm]) -> io::Result<(DigestSet, LocalFileRef)> {
    let mut file = File::open(path)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    let local = LocalFileRef::from_metadata(path.to_path_buf(), &meta)?;
    let (digests, _) = digest_reader(&mut file, algorithms)?;
    Ok((digests, local))
}

/// The default worker count: one per available CPU.
pub fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

type WalkResult = Result<DigestedFile, WalkError>;

struct Job {
    local_path: PathBuf,
    rel: String,
}

/// Internal stop flag plus the caller's token.
#[derive(Clone)]
struct StopSignal {
    internal: CancelToken,
    external: Option<CancelToken>,
}

impl StopSignal {
    fn is_set(&self) -> bool {
        self.internal.is_canceled() || self.external.as_ref().is_some_and(CancelToken::is_canceled)
    }

    fn externally_canceled(&self) -> bool {
        self.external.as_ref().is_some_and(CancelToken::is_canceled)
    }
}

/// Start digesting every regular file under `root`.
///
/// Symbolic links and other non-regular entries are skipped. Unless
/// `include_hidden` is set, entries whose name starts with `.` are skipped
/// together with everything below them.
pub fn walk_digests(
    root: &Path,
    algorithms: &[Algorithm],
    options: &WalkOptions,
) -> Result<DigestWalk, WalkError> {
    let workers = match options.concurrency {
        0 => default_concurrency(),
        n => n,
    };
    let signal = StopSignal {
        internal: CancelToken::new(),
        external: options.cancel.clone(),
    };
    let (job_tx, job_rx) = bounded::<Job>(workers * 2);
    let (result_tx, result_rx) = bounded::<WalkResult>(workers * 2);
    let spawn_err = |source: io::Error| WalkError::Io {
        path: root.to_path_buf(),
        source,
    };

    let mut handles = Vec::with_capacity(workers + 1);
    for idx in 0..workers {
        let jobs = job_rx.clone();
        let results = result_tx.clone();
        let worker_signal = signal.clone();
        let algorithms = algorithms.to_vec();
        let spawned = thread::Builder::new()
            .name(format!("vstage-digest-{idx}"))
            .spawn(move || digest_worker(jobs, results, worker_signal, algorithms));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                signal.internal.cancel();
                return Err(spawn_err(err));
            }
        }
    }
    drop(job_rx);

    let feeder = {
        let root = root.to_path_buf();
        let include_hidden = options.include_hidden;
        let feeder_signal = signal.clone();
        thread::Builder::new()
            .name("vstage-walk".into())
            .spawn(move || feed(root, include_hidden, job_tx, result_tx, feeder_signal))
    };
    match feeder {
        Ok(handle) => handles.push(handle),
        Err(err) => {
            signal.internal.cancel();
            return Err(spawn_err(err));
        }
    }
    debug!(root = %root.display(), workers, "digest walk started");
    Ok(DigestWalk {
        results: result_rx,
        signal,
        handles,
        done: false,
    })
}

fn feed(
    root: PathBuf,
    include_hidden: bool,
    jobs: Sender<Job>,
    results: Sender<WalkResult>,
    signal: StopSignal,
) {
    let entries = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| include_hidden || entry.depth() == 0 || !is_hidden(entry));
    for entry in entries {
        if signal.is_set() {
            return;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                fail(&signal, &results, WalkError::Walk(err));
                return;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match relative_logical(&root, entry.path()) {
            Ok(rel) => rel,
            Err(err) => {
                fail(&signal, &results, err);
                return;
            }
        };
        let job = Job {
            local_path: entry.into_path(),
            rel,
        };
        if jobs.send(job).is_err() {
            return;
        }
    }
}

fn digest_worker(
    jobs: Receiver<Job>,
    results: Sender<WalkResult>,
    signal: StopSignal,
    algorithms: Vec<Algorithm>,
) {
    for job in jobs.iter() {
        if signal.is_set() {
            return;
        }
        match digest_file(&job.local_path, &algorithms) {
            Ok((digests, local)) => {
                let file = DigestedFile {
                    path: job.rel,
                    local,
                    digests,
                };
                if results.send(Ok(file)).is_err() {
                    return;
                }
            }
            Err(source) => {
                let err = WalkError::Io {
                    path: job.local_path,
                    source,
                };
                fail(&signal, &results, err);
                return;
            }
        }
    }
}

fn fail(signal: &StopSignal, results: &Sender<WalkResult>, err: WalkError) {
    signal.internal.cancel();
    let _ = results.send(Err(err));
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().as_encoded_bytes().first() == Some(&b'.')
}

fn relative_logical(root: &Path, path: &Path) -> Result<String, WalkError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| WalkError::NonUtf8Path(path.to_path_buf()))?;
    let mut segments = Vec::new();
    for component in rel.components() {
        if let Component::Normal(name) = component {
            let name = name
                .to_str()
                .ok_or_else(|| WalkError::NonUtf8Path(path.to_path_buf()))?;
            segments.push(name);
        }
    }
    Ok(segments.join("/"))
}

/// Lazily yields digested files as workers finish them.
///
/// Dropping the walk before it is exhausted stops the threads and waits for
/// them. The caller's token is never set by the walk itself.
pub struct DigestWalk {
    results: Receiver<WalkResult>,
    signal: StopSignal,
    handles: Vec<JoinHandle<()>>,
    done: bool,
}

impl DigestWalk {
    fn stop(&mut self) {
        self.done = true;
        self.signal.internal.cancel();
        while self.results.recv().is_ok() {}
        self.join();
    }

    fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Iterator for DigestWalk {
    type Item = Result<DigestedFile, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.results.recv() {
            Ok(Ok(file)) => Some(Ok(file)),
            Ok(Err(err)) => {
                self.stop();
                Some(Err(err))
            }
            Err(_) => {
                // Every sender is gone: the feeder and all workers returned.
                self.done = true;
                self.join();
                if self.signal.externally_canceled() {
                    Some(Err(WalkError::Canceled))
                } else {
                    None
                }
            }
        }
    }
}

impl Drop for DigestWalk {
    fn drop(&mut self) {
        if !self.done {
            self.stop();
        }
    }
}

impl std::fmt::Debug for DigestWalk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestWalk")
            .field("threads", &self.handles.len())
            .field("done", &self.done)
            .finish()
    }
}
