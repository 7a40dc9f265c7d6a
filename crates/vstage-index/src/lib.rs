//! Staging index for vstage.
//!
//! A [`Stage`] is a durable, content-addressed change-set for one versioned
//! object: the logical state the next version should have, plus references
//! to the local files whose content is not yet in the store. Stages are
//! mutated by adding files or whole directory trees and by removing paths,
//! persisted between invocations with [`StageFile`], validated, and finally
//! handed to an [`ObjectStore`](vstage_store::ObjectStore) as a
//! [`CommitDescriptor`](vstage_store::CommitDescriptor).
//!
//! # Key Types
//!
//! - [`Stage`] -- The change-set and its mutation API
//! - [`LocalFileRef`] -- Source path, size and mtime captured at staging time
//! - [`DigestWalk`] -- Lazy, concurrent, multi-algorithm directory digester
//! - [`ValidationReport`] -- Every finding from the pre-commit checks
//! - [`StageFile`] -- JSON persistence with atomic replace
//! - [`StateDiff`] -- Path-level changes between two states
//!
//! # Invariants
//!
//! 1. Every state key is a valid logical path.
//! 2. No state key is a segment-boundary prefix of another (a path is never
//!    both a file and a directory).
//! 3. Before commit, every state digest is either already stored or backed
//!    by a local file.
//! 4. At most one local file is kept per digest; the first one staged wins.

pub mod commit;
pub mod entry;
pub mod error;
pub mod observer;
pub mod persist;
pub mod stage;
pub mod status;
pub mod validate;
pub mod walk;

pub use commit::{commit_stage, StagedContent};
pub use entry::{Drift, LocalFileRef};
pub use error::{StageError, StageResult};
pub use observer::{NoopObserver, StageEvent, StageObserver, TracingObserver};
pub use persist::{from_json, to_json, StageFile};
pub use stage::{AddTreeOptions, AddTreeSummary, MergeOutcome, Stage};
pub use status::{diff_states, PathChange, StateDiff};
pub use validate::{content_drift_check, structural_check, Finding, FindingKind, ValidationReport};
pub use walk::{digest_file, walk_digests, CancelToken, DigestWalk, DigestedFile, WalkError, WalkOptions};
