//! Local content references.

use std::fmt;
use std::fs::{self, Metadata};
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the bytes for a staged digest live before commit.
///
/// Size and modification time are captured when the file is digested. If
/// either differs at commit time the digest can no longer be trusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileRef {
    /// Absolute path of the source file.
    pub path: PathBuf,
    pub size: u64,
    pub modtime: DateTime<Utc>,
}

impl LocalFileRef {
    /// Capture size and mtime from already-fetched metadata.
    pub fn from_metadata(path: PathBuf, meta: &Metadata) -> io::Result<Self> {
        Ok(Self {
            path,
            size: meta.len(),
            modtime: DateTime::<Utc>::from(meta.modified()?),
        })
    }

    /// Compare the file on disk with what was captured.
    ///
    /// Returns `None` while size and mtime still match.
    pub fn drift(&self) -> Option<Drift> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(err) => return Some(Drift::Unreadable(err.to_string())),
        };
        if meta.len() != self.size {
            return Some(Drift::Size {
                staged: self.size,
                current: meta.len(),
            });
        }
        let current = match meta.modified() {
            Ok(mtime) => DateTime::<Utc>::from(mtime),
            Err(err) => return Some(Drift::Unreadable(err.to_string())),
        };
        if current != self.modtime {
            return Some(Drift::Modtime {
                staged: self.modtime,
                current,
            });
        }
        None
    }
}

/// How a local file differs from its staged snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Drift {
    /// The file could not be stat'ed (deleted, permissions, ...).
    Unreadable(String),
    Size { staged: u64, current: u64 },
    Modtime {
        staged: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::Unreadable(reason) => write!(f, "file is unreadable: {reason}"),
            Drift::Size { staged, current } => {
                write!(f, "size changed from {staged} to {current} bytes")
            }
            Drift::Modtime { staged, current } => {
                write!(f, "modified since staging ({staged} -> {current})")
            }
        }
    }
}
