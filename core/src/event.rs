//! Progress and per-file diff events published while a run is in progress.

use serde::Serialize;
use tokio::sync::broadcast;

/// Query-phase progress value that marks a completed run.
pub const QUERY_FINISHED: f64 = 1000.0;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Coarse phase milestone, `progress` is 0 or [`QUERY_FINISHED`].
    Query,
    /// Per-file completion fraction in `[0, 1]`.
    Determinate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub progress: f64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "file")]
pub struct FileEvent {
    pub path: String,
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdateEvent {
    Progress(ProgressEvent),
    File(FileEvent),
}

impl UpdateEvent {
    pub fn query(progress: f64, title: impl Into<String>) -> Self {
        UpdateEvent::Progress(ProgressEvent {
            kind: ProgressKind::Query,
            progress,
            title: title.into(),
        })
    }

    pub fn determinate(progress: f64, title: impl Into<String>) -> Self {
        UpdateEvent::Progress(ProgressEvent {
            kind: ProgressKind::Determinate,
            progress,
            title: title.into(),
        })
    }

    pub fn file(path: impl Into<String>, diff: impl Into<String>) -> Self {
        UpdateEvent::File(FileEvent { path: path.into(), diff: diff.into() })
    }

    pub fn as_progress(&self) -> Option<&ProgressEvent> {
        match self {
            UpdateEvent::Progress(p) => Some(p),
            UpdateEvent::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileEvent> {
        match self {
            UpdateEvent::File(f) => Some(f),
            UpdateEvent::Progress(_) => None,
        }
    }
}

/// Multicast channel for [`UpdateEvent`]s. Late subscribers only see events
/// published after they subscribed.
#[derive(Debug, Clone)]
pub struct EventStream {
    tx: broadcast::Sender<UpdateEvent>,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: UpdateEvent) {
        // No subscribers is not an error: the engine also runs headless.
        if self.tx.send(event).is_err() {
            tracing::trace!("update event dropped, no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
