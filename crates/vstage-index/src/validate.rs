//! Pre-commit validation.
//!
//! Two passes, both exhaustive:
//!
//! - [`structural_check`] looks only at the stage's maps: every path is a
//!   valid logical path, no path is both a file and a directory, and every
//!   digest is either stored or backed by a local file.
//! - [`content_drift_check`] stats every local file and reports those whose
//!   size or modification time changed since they were digested.

use std::fmt;
use std::ops::Bound;

use vstage_types::validate_logical_path;

use crate::stage::Stage;

/// Category of a validation finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FindingKind {
    InvalidLogicalPath,
    PathConflict,
    DanglingDigest,
    ContentDrifted,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FindingKind::InvalidLogicalPath => "invalid-path",
            FindingKind::PathConflict => "path-conflict",
            FindingKind::DanglingDigest => "dangling-digest",
            FindingKind::ContentDrifted => "content-drifted",
        };
        f.write_str(name)
    }
}

/// A single problem found by validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    /// The logical path or local file concerned.
    pub subject: String,
    pub digest: Option<String>,
    pub detail: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.detail)
    }
}

/// Every finding from one validation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing was found.
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Findings of one kind.
    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{finding}")?;
        }
        Ok(())
    }
}

/// Check the stage's maps for internal consistency. Touches no files.
pub fn structural_check(stage: &Stage) -> Vec<Finding> {
    let state = &stage.next_state;
    let mut findings = Vec::new();

    for (path, digest) in state {
        if let Err(err) = validate_logical_path(path) {
            findings.push(Finding {
                kind: FindingKind::InvalidLogicalPath,
                subject: path.clone(),
                digest: Some(digest.clone()),
                detail: err.to_string(),
            });
        }

        // Keys sort so that every path under `path/` follows it contiguously.
        let dir = format!("{path}/");
        let nested = state
            .range::<str, _>((Bound::Included(dir.as_str()), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&dir));
        for inner in nested {
            findings.push(Finding {
                kind: FindingKind::PathConflict,
                subject: path.clone(),
                digest: None,
                detail: format!("{path:?} is both a file and the directory of {inner:?}"),
            });
        }

        if !stage.existing.contains(digest) && !stage.local_content.contains_key(digest) {
            findings.push(Finding {
                kind: FindingKind::DanglingDigest,
                subject: path.clone(),
                digest: Some(digest.clone()),
                detail: "digest is neither stored nor staged from a local file".to_string(),
            });
        }
    }
    findings
}

/// Stat every local file and report those changed since staging.
pub fn content_drift_check(stage: &Stage) -> Vec<Finding> {
    stage
        .local_content
        .iter()
        .filter_map(|(digest, local)| {
            local.drift().map(|drift| Finding {
                kind: FindingKind::ContentDrifted,
                subject: local.path.display().to_string(),
                digest: Some(digest.clone()),
                detail: drift.to_string(),
            })
        })
        .collect()
}

impl Stage {
    /// Run both validation passes.
    pub fn validate(&self) -> ValidationReport {
        let mut findings = structural_check(self);
        findings.extend(content_drift_check(self));
        ValidationReport { findings }
    }
}
