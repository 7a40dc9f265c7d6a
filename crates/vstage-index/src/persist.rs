//! Stage persistence.
//!
//! A stage is stored as one JSON document tagged with a schema id, so the
//! format can evolve without misreading old records. Writes go to a
//! temporary file in the same directory that is then renamed over the
//! record, so a crash never leaves a half-written stage.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use vstage_digest::{Algorithm, DigestSet};
use vstage_types::{ObjectId, VersionNum};

use crate::entry::LocalFileRef;
use crate::error::{StageError, StageResult};
use crate::observer::{StageObserver, TracingObserver};
use crate::stage::Stage;

#[derive(Serialize, Deserialize)]
#[serde(tag = "schema")]
enum StageRecord {
    #[serde(rename = "vstage/stage-v1")]
    V1(StageRecordV1),
}

#[derive(Serialize, Deserialize)]
struct StageRecordV1 {
    object_id: ObjectId,
    next_version: VersionNum,
    digest_algorithm: String,
    #[serde(default)]
    fixity_algorithms: Vec<String>,
    next_state: BTreeMap<String, String>,
    #[serde(default)]
    existing: BTreeSet<String>,
    #[serde(default)]
    local_content: BTreeMap<String, LocalFileRef>,
    #[serde(default)]
    fixity: BTreeMap<String, DigestSet>,
}

impl StageRecord {
    fn from_stage(stage: &Stage) -> Self {
        StageRecord::V1(StageRecordV1 {
            object_id: stage.id.clone(),
            next_version: stage.next_version,
            digest_algorithm: stage.algorithm.id().to_string(),
            fixity_algorithms: stage
                .fixity_algorithms
                .iter()
                .map(|alg| alg.id().to_string())
                .collect(),
            next_state: stage.next_state.clone(),
            existing: stage.existing.clone(),
            local_content: stage.local_content.clone(),
            fixity: stage.fixity.clone(),
        })
    }

    fn into_stage(self, observer: Arc<dyn StageObserver>) -> StageResult<Stage> {
        let StageRecord::V1(record) = self;
        let fixity_algorithms = record
            .fixity_algorithms
            .iter()
            .map(|id| Algorithm::from_id(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Stage {
            id: record.object_id,
            next_version: record.next_version,
            algorithm: Algorithm::from_id(&record.digest_algorithm)?,
            fixity_algorithms,
            next_state: record.next_state,
            existing: record.existing,
            local_content: record.local_content,
            fixity: record.fixity,
            observer,
        })
    }
}

/// Encode a stage as JSON.
pub fn to_json(stage: &Stage) -> StageResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&StageRecord::from_stage(stage))?)
}

/// Decode a stage from JSON.
pub fn from_json(bytes: &[u8], observer: Arc<dyn StageObserver>) -> StageResult<Stage> {
    let record: StageRecord = serde_json::from_slice(bytes)?;
    record.into_stage(observer)
}

/// The on-disk record of the active stage.
#[derive(Clone, Debug)]
pub struct StageFile {
    path: PathBuf,
}

impl StageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if a readable stage record exists.
    pub fn exists(&self) -> bool {
        self.read_with_observer(Arc::new(TracingObserver)).is_ok()
    }

    /// Read the active stage, logging changes through `tracing`.
    ///
    /// A missing or unreadable record is [`StageError::StageNotFound`].
    pub fn read(&self) -> StageResult<Stage> {
        self.read_with_observer(Arc::new(TracingObserver))
    }

    pub fn read_with_observer(&self, observer: Arc<dyn StageObserver>) -> StageResult<Stage> {
        let not_found = |reason: String| StageError::StageNotFound {
            path: self.path.clone(),
            reason,
        };
        let bytes = fs::read(&self.path).map_err(|err| not_found(err.to_string()))?;
        let record: StageRecord =
            serde_json::from_slice(&bytes).map_err(|err| not_found(err.to_string()))?;
        let stage = record.into_stage(observer)?;
        debug!(path = %self.path.display(), object = %stage.id(), entries = stage.len(), "stage read");
        Ok(stage)
    }

    /// Write a new record. Fails if an active stage is already recorded.
    pub fn create(&self, stage: &Stage) -> StageResult<()> {
        if self.exists() {
            return Err(StageError::StageAlreadyExists(self.path.clone()));
        }
        self.write(stage)
    }

    /// Atomically replace the record with `stage`.
    pub fn write(&self, stage: &Stage) -> StageResult<()> {
        let bytes = to_json(stage)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(StageError::io(dir))?;
        tmp.write_all(&bytes).map_err(StageError::io(dir))?;
        tmp.as_file().sync_all().map_err(StageError::io(dir))?;
        tmp.persist(&self.path)
            .map_err(|err| StageError::Io {
                path: self.path.clone(),
                source: err.error,
            })?;
        debug!(path = %self.path.display(), entries = stage.len(), "stage written");
        Ok(())
    }

    /// Delete the record. A record that is already gone is not an error.
    pub fn remove(&self) -> StageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StageError::Io {
                path: self.path.clone(),
                source: err,
            }),
        }
    }
}
