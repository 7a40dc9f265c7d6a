//! Path-level differences between two states.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

/// A change to one logical path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathChange {
    Added { path: String, digest: String },
    Modified { path: String, old: String, new: String },
    Removed { path: String, digest: String },
    /// Content moved to a new path unchanged.
    Renamed { from: String, to: String, digest: String },
}

impl PathChange {
    /// The path the change lands on (the new path for renames).
    pub fn path(&self) -> &str {
        match self {
            PathChange::Added { path, .. }
            | PathChange::Modified { path, .. }
            | PathChange::Removed { path, .. } => path,
            PathChange::Renamed { to, .. } => to,
        }
    }
}

impl fmt::Display for PathChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathChange::Added { path, .. } => write!(f, "A  {path}"),
            PathChange::Modified { path, .. } => write!(f, "M  {path}"),
            PathChange::Removed { path, .. } => write!(f, "D  {path}"),
            PathChange::Renamed { from, to, .. } => write!(f, "R  {from} -> {to}"),
        }
    }
}

/// All changes between two states, ordered by path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateDiff {
    pub changes: Vec<PathChange>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathChange> {
        self.changes.iter()
    }
}

impl fmt::Display for StateDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(f, "{change}")?;
        }
        Ok(())
    }
}

/// Compare two `path -> digest` states.
///
/// A path removed from `base` and a path added in `next` with the same
/// digest are reported as one rename. When several paths share a digest,
/// removed and added paths are paired in path order.
pub fn diff_states(base: &BTreeMap<String, String>, next: &BTreeMap<String, String>) -> StateDiff {
    let mut changes = Vec::new();
    let mut removed: HashMap<&str, VecDeque<&str>> = HashMap::new();

    for (path, digest) in base {
        match next.get(path) {
            Some(new) if new == digest => {}
            Some(new) => changes.push(PathChange::Modified {
                path: path.clone(),
                old: digest.clone(),
                new: new.clone(),
            }),
            None => removed
                .entry(digest.as_str())
                .or_default()
                .push_back(path.as_str()),
        }
    }

    for (path, digest) in next {
        if base.contains_key(path) {
            continue;
        }
        let from = removed
            .get_mut(digest.as_str())
            .and_then(VecDeque::pop_front);
        changes.push(match from {
            Some(from) => PathChange::Renamed {
                from: from.to_string(),
                to: path.clone(),
                digest: digest.clone(),
            },
            None => PathChange::Added {
                path: path.clone(),
                digest: digest.clone(),
            },
        });
    }

    for (digest, paths) in removed {
        for path in paths {
            changes.push(PathChange::Removed {
                path: path.to_string(),
                digest: digest.to_string(),
            });
        }
    }

    changes.sort_by(|a, b| a.path().cmp(b.path()));
    StateDiff { changes }
}
