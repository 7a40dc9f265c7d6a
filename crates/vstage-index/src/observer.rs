//! Change notifications for stage mutations.
//!
//! A [`Stage`](crate::Stage) reports every path it adds, updates or removes to
//! its observer. The default observer logs through `tracing`; embedders can
//! supply their own to drive progress output.

use tracing::info;

/// A single change applied to a stage's next state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageEvent {
    Added { path: String, digest: String },
    Updated { path: String, digest: String },
    Removed { path: String },
}

impl StageEvent {
    /// The logical path the event concerns.
    pub fn path(&self) -> &str {
        match self {
            StageEvent::Added { path, .. }
            | StageEvent::Updated { path, .. }
            | StageEvent::Removed { path } => path,
        }
    }
}

/// Receives stage change events.
pub trait StageObserver: Send + Sync {
    fn on_event(&self, event: &StageEvent);
}

/// Logs each event at `info` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_event(&self, event: &StageEvent) {
        match event {
            StageEvent::Added { path, digest } => info!(path = %path, digest = %digest, "file added"),
            StageEvent::Updated { path, digest } => {
                info!(path = %path, digest = %digest, "file updated")
            }
            StageEvent::Removed { path } => info!(path = %path, "file removed"),
        }
    }
}

/// Discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_event(&self, _event: &StageEvent) {}
}
