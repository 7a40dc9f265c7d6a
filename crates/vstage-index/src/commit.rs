//! Turning a validated stage into a commit.

use std::collections::BTreeMap;
use std::fs::File;
use std::sync::Arc;

use tracing::info;
use vstage_digest::DigestSet;
use vstage_store::{
    CommitDescriptor, CommitReceipt, ContentRef, ContentSource, ObjectStore, StoreResult,
};

use crate::entry::LocalFileRef;
use crate::error::{StageError, StageResult};
use crate::persist::StageFile;
use crate::stage::Stage;

/// Serves a stage's local files to an object store.
///
/// Holds its own copy of the stage's content maps, so the stage can keep
/// changing while a commit is in flight. Files are opened only when the
/// store asks for them.
#[derive(Clone, Debug, Default)]
pub struct StagedContent {
    local: BTreeMap<String, LocalFileRef>,
    fixity: BTreeMap<String, DigestSet>,
}

impl StagedContent {
    pub fn from_stage(stage: &Stage) -> Self {
        Self {
            local: stage.local_content.clone(),
            fixity: stage.fixity.clone(),
        }
    }
}

impl ContentSource for StagedContent {
    fn get_content(&self, digest: &str) -> StoreResult<Option<ContentRef>> {
        let Some(local) = self.local.get(digest) else {
            return Ok(None);
        };
        let file = File::open(&local.path)?;
        Ok(Some(ContentRef::new(
            local.path.display().to_string(),
            Box::new(file),
        )))
    }

    fn get_fixity(&self, digest: &str) -> DigestSet {
        self.fixity.get(digest).cloned().unwrap_or_default()
    }
}

impl Stage {
    /// Validate the stage and describe it as a commit.
    ///
    /// Fails with [`StageError::ValidationFailed`] carrying every finding if
    /// either validation pass finds anything. No bytes are copied.
    pub fn build_commit(&self) -> StageResult<CommitDescriptor> {
        let report = self.validate();
        if !report.is_valid() {
            return Err(StageError::ValidationFailed(report));
        }
        Ok(CommitDescriptor::new(
            self.id.clone(),
            self.next_version,
            self.algorithm,
            self.next_state.clone(),
            Arc::new(StagedContent::from_stage(self)),
        ))
    }
}

/// Validate, commit to `store`, then discard the persisted stage.
///
/// The stage record is removed only after the store accepts the commit; on
/// any failure it is left as it was.
pub fn commit_stage(
    stage: &Stage,
    store: &dyn ObjectStore,
    record: Option<&StageFile>,
) -> StageResult<CommitReceipt> {
    let descriptor = stage.build_commit()?;
    let receipt = store.commit(&descriptor)?;
    info!(
        object = %receipt.object_id,
        version = %receipt.version,
        pulled = receipt.pulled,
        "stage committed"
    );
    if let Some(record) = record {
        record.remove()?;
    }
    Ok(receipt)
}
