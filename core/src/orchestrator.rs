//! Drives one update run over a project directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::{Result, UpdateError};
use crate::event::{EventStream, QUERY_FINISHED, UpdateEvent};
use crate::overlay::{ChangedFile, Overlay, ProjectFile, ProjectHost, WriteReport};
use crate::pipeline::FileUpdater;
use crate::walk::{pause, read_dir_recursive};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Reading,
    Transforming,
    Finished,
    Canceled,
    Errored,
}

/// What to do when a single file fails to parse, transform or serialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// End the run with an error event.
    #[default]
    Abort,
    /// Leave the file as it is and continue with the next one.
    SkipFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Directory names never entered, matched against whole path segments.
    pub skip_dirs: Vec<String>,
    /// Pause after each file is transformed.
    pub file_pacing: Duration,
    /// Pause after each phase event.
    pub phase_pause: Duration,
    /// Pause before each write or delete during a commit.
    pub write_pacing: Duration,
    pub error_policy: ErrorPolicy,
    pub event_capacity: usize,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            skip_dirs: vec!["node_modules".to_string()],
            file_pacing: Duration::ZERO,
            phase_pause: Duration::ZERO,
            write_pacing: Duration::ZERO,
            error_policy: ErrorPolicy::Abort,
            event_capacity: 1024,
        }
    }
}

/// Cooperative cancellation flag shared with whoever may stop a run.
/// Checked once per file, after the file is transformed and before its
/// result is merged.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ProjectUpdaterBuilder {
    root: PathBuf,
    updaters: Vec<Box<dyn FileUpdater>>,
    options: UpdateOptions,
    cancel: CancelHandle,
}

impl ProjectUpdaterBuilder {
    /// Registers an updater. The first registered updater that supports a
    /// path handles it.
    pub fn updater(mut self, updater: impl FileUpdater + 'static) -> Self {
        self.updaters.push(Box::new(updater));
        self
    }

    pub fn boxed_updater(mut self, updater: Box<dyn FileUpdater>) -> Self {
        self.updaters.push(updater);
        self
    }

    pub fn skip_dir(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.options.skip_dirs.contains(&name) {
            self.options.skip_dirs.push(name);
        }
        self
    }

    pub fn options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> ProjectUpdater {
        let events = EventStream::new(self.options.event_capacity);
        ProjectUpdater {
            overlay: Overlay::new(self.root.clone(), events.clone()),
            root: self.root,
            updaters: self.updaters,
            options: self.options,
            events,
            cancel: self.cancel,
            state: RunState::Idle,
            skipped: Vec::new(),
        }
    }
}

/// Walks a project, runs every file through the first updater that claims
/// it and collects the results as pending edits. Nothing touches disk until
/// [`write_changes`](Self::write_changes) is called.
pub struct ProjectUpdater {
    root: PathBuf,
    updaters: Vec<Box<dyn FileUpdater>>,
    options: UpdateOptions,
    overlay: Overlay,
    events: EventStream,
    cancel: CancelHandle,
    state: RunState,
    skipped: Vec<SkippedFile>,
}

impl ProjectUpdater {
    pub fn builder(root: impl Into<PathBuf>) -> ProjectUpdaterBuilder {
        ProjectUpdaterBuilder {
            root: root.into(),
            updaters: Vec::new(),
            options: UpdateOptions::default(),
            cancel: CancelHandle::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn options(&self) -> &UpdateOptions {
        &self.options
    }

    /// Name of the updater that would handle `path`, if any.
    pub fn updater_for(&self, path: &str) -> Option<&'static str> {
        self.updaters.iter().find(|u| u.supports(path)).map(|u| u.name())
    }

    /// Receives events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Net pending edits of the last run.
    pub fn changes(&self) -> Vec<&ChangedFile> {
        self.overlay.changes()
    }

    /// Files left untouched under [`ErrorPolicy::SkipFile`].
    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    /// Runs one update. Failures do not escape: they are reported as an
    /// `An error occurred.` event and leave the updater ready for another run.
    ///
    /// Event order: the phase events, one determinate event per merged file,
    /// then one file event per net change (in walk order, created files last),
    /// then `Update finished.` or `Update canceled.`. Each diff covers every
    /// edit its path received during the run, including edits plugins made
    /// while other files were processed.
    pub async fn update(&mut self) -> RunState {
        self.reset();

        let is_dir = tokio::fs::metadata(&self.root).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            let err = UpdateError::NotADirectory(self.root.clone());
            tracing::warn!(root = %self.root.display(), "not a directory");
            self.events.publish(UpdateEvent::query(0.0, err.to_string()));
            self.state = RunState::Errored;
            return self.state;
        }

        self.events.publish(UpdateEvent::query(0.0, "Initializing..."));
        match self.run().await {
            Ok(state) => self.state = state,
            Err(err) => {
                tracing::error!(error = %err, "update failed");
                self.events.publish(UpdateEvent::query(0.0, format!("An error occurred. {err}")));
                self.reset();
                self.state = RunState::Errored;
            }
        }
        self.state
    }

    async fn run(&mut self) -> Result<RunState> {
        self.state = RunState::Reading;
        let paths = read_dir_recursive(&self.root, &self.options.skip_dirs).await?;
        self.events.publish(UpdateEvent::query(0.0, "Reading files..."));
        pause(self.options.phase_pause).await;
        for path in &paths {
            let abs = self.root.join(path);
            let bytes = tokio::fs::read(&abs).await.map_err(|e| UpdateError::io(&abs, e))?;
            self.overlay.insert_baseline(ProjectFile::from_bytes(path.as_str(), bytes));
        }
        tracing::debug!(files = paths.len(), "snapshot loaded");

        self.state = RunState::Transforming;
        self.events.publish(UpdateEvent::query(0.0, "Updating files..."));
        pause(self.options.phase_pause).await;

        let total = self.overlay.files().len();
        let mut canceled = false;
        for i in 0..total {
            let file = &self.overlay.files()[i];
            let path = file.path.clone();
            let binary = file.binary;

            let result = if binary {
                tracing::debug!(path = %path, "binary file, passing through");
                None
            } else {
                self.transform(&path).await?
            };

            pause(self.options.file_pacing).await;
            if self.cancel.is_canceled() {
                tracing::info!(path = %path, "update canceled");
                canceled = true;
                break;
            }
            self.events
                .publish(UpdateEvent::determinate((i + 1) as f64 / total as f64, format!("Updating {path}...")));
            if let Some(content) = result {
                self.overlay.add_file(&path, content);
            }
        }

        let published = self.overlay.publish_changes().await;
        tracing::info!(files = total, changed = published, skipped = self.skipped.len(), "update done");
        if canceled {
            self.events.publish(UpdateEvent::query(0.0, "Update canceled."));
            Ok(RunState::Canceled)
        } else {
            self.events.publish(UpdateEvent::query(QUERY_FINISHED, "Update finished."));
            Ok(RunState::Finished)
        }
    }

    /// New content for `path`, or `None` when it has nothing to merge.
    async fn transform(&mut self, path: &str) -> Result<Option<String>> {
        let Some(current) = self.overlay.read_file(path) else {
            tracing::debug!(path, "deleted earlier in this run");
            return Ok(None);
        };
        let Some(updater) = self.updaters.iter_mut().find(|u| u.supports(path)) else {
            return Ok(Some(current));
        };
        tracing::debug!(path, updater = updater.name(), "updating");
        match updater.update(&current, path, &mut self.overlay).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if self.options.error_policy == ErrorPolicy::SkipFile => {
                tracing::warn!(path, error = %err, "skipping file");
                self.skipped.push(SkippedFile { path: path.to_string(), error: err.to_string() });
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Commits the pending edits of the last run to disk.
    pub async fn write_changes(&mut self) -> Result<WriteReport> {
        let report = self.overlay.write_changes(self.options.write_pacing).await?;
        tracing::info!(written = report.written.len(), deleted = report.deleted.len(), "changes written");
        Ok(report)
    }

    fn reset(&mut self) {
        self.overlay.clear();
        for updater in &mut self.updaters {
            updater.reset();
        }
        self.skipped.clear();
        self.cancel.reset();
        self.state = RunState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::TextFormat;
    use crate::pipeline::{PluginOutcome, Updater};
    use pretty_assertions::assert_eq;

    fn drain(rx: &mut broadcast::Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn titles(events: &[UpdateEvent]) -> Vec<String> {
        events.iter().filter_map(|e| e.as_progress().map(|p| p.title.clone())).collect()
    }

    #[test]
    fn cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let other = handle.clone();
        other.cancel();
        assert!(handle.is_canceled());
        handle.reset();
        assert!(!other.is_canceled());
    }

    #[test]
    fn builder_keeps_default_skip_dirs() {
        let updater = ProjectUpdater::builder("/tmp").skip_dir("dist").skip_dir("node_modules").build();
        assert_eq!(updater.options().skip_dirs, vec!["node_modules", "dist"]);
        assert_eq!(updater.state(), RunState::Idle);
    }

    #[test]
    fn first_supporting_updater_wins() {
        let updater = ProjectUpdater::builder("/tmp")
            .updater(Updater::new(crate::formats::JsonFormat::new()))
            .updater(Updater::new(TextFormat::new()))
            .build();
        assert_eq!(updater.updater_for("package.json"), Some("json"));
        assert_eq!(updater.updater_for("README.md"), Some("text"));
        assert_eq!(updater.updater_for("logo.png"), None);
    }

    #[tokio::test]
    async fn emits_phase_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b\n").unwrap();

        let mut updater = ProjectUpdater::builder(dir.path()).updater(Updater::new(TextFormat::new())).build();
        let mut rx = updater.subscribe();
        assert_eq!(updater.update().await, RunState::Finished);

        let events = drain(&mut rx);
        assert_eq!(
            titles(&events),
            vec![
                "Initializing...",
                "Reading files...",
                "Updating files...",
                "Updating a.txt...",
                "Updating b.txt...",
                "Update finished.",
            ]
        );
        let progress: Vec<f64> = events.iter().filter_map(|e| e.as_progress()).map(|p| p.progress).collect();
        assert_eq!(progress, vec![0.0, 0.0, 0.0, 0.5, 1.0, QUERY_FINISHED]);
    }

    #[tokio::test]
    async fn files_without_an_updater_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.svg"), "<svg/>").unwrap();
        let mut updater = ProjectUpdater::builder(dir.path()).build();
        assert_eq!(updater.update().await, RunState::Finished);
        assert!(updater.changes().is_empty());
        assert_eq!(updater.overlay().files().len(), 1);
    }

    #[tokio::test]
    async fn binary_files_are_not_handed_to_updaters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob"), [0xffu8, 0xfe, 0x00]).unwrap();
        let mut updater = ProjectUpdater::builder(dir.path())
            .updater(Updater::new(TextFormat::new()).with_plugin(|_, _, _| Ok(PluginOutcome::Delete)))
            .build();
        assert_eq!(updater.update().await, RunState::Finished);
        assert!(updater.changes().is_empty());
        assert!(updater.overlay().exists("blob"));
    }

    #[tokio::test]
    async fn missing_root_reports_an_event() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let mut updater = ProjectUpdater::builder(&missing).build();
        let mut rx = updater.subscribe();
        assert_eq!(updater.update().await, RunState::Errored);
        let events = drain(&mut rx);
        assert_eq!(titles(&events), vec![format!("The path {} is not a directory.", missing.display())]);
    }
}
