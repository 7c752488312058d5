//! In-memory view of the project used during a run.
//!
//! The overlay holds the baseline snapshot read from disk at the start of a
//! run and the pending edits accumulated since. Plugins only see it through
//! [`ProjectHost`]; disk is touched once, by [`Overlay::write_changes`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::diff::unified_diff;
use crate::error::{Result, UpdateError};
use crate::event::{EventStream, UpdateEvent};
use crate::walk::{is_within, normalize_path, parent_dir, pause};

/// Capabilities a plugin gets over the whole project while one file is being
/// processed. Reads observe edits made earlier in the same run.
pub trait ProjectHost {
    fn exists(&self, path: &str) -> bool;

    /// Files directly in `path`, or anywhere below it when `recursive`.
    /// `""` and `"."` name the project root.
    fn read_dir(&self, path: &str, recursive: bool) -> Vec<String>;

    /// Current content of `path`, `None` when it does not exist (or was deleted).
    fn read_file(&self, path: &str) -> Option<String>;

    fn delete_file(&mut self, path: &str) {
        self.add_file(path, String::new());
    }

    /// Records `content` as the new content of `path`. Empty content deletes it.
    fn add_file(&mut self, path: &str, content: String);
}

/// A file as read from disk when the run started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
    /// Not valid UTF-8; `content` is a lossy rendering and no adapter sees it.
    pub binary: bool,
}

impl ProjectFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: content.into(), binary: false }
    }

    pub fn from_bytes(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(content) => Self::new(path, content),
            Err(e) => Self {
                path: path.into(),
                content: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                binary: true,
            },
        }
    }
}

/// Pending edit of one path: its pre-run content and the latest proposed
/// content. Empty `content` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: String,
    pub original: String,
    pub content: String,
}

impl ChangedFile {
    pub fn is_tombstone(&self) -> bool {
        self.content.is_empty()
    }

    /// Whether the latest content differs from what existed before the run.
    pub fn is_net_change(&self) -> bool {
        self.original != self.content
    }

    pub fn diff(&self) -> String {
        unified_diff(&self.path, &self.original, &self.content)
    }
}

/// Paths touched by [`Overlay::write_changes`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub written: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug)]
pub struct Overlay {
    root: PathBuf,
    files: Vec<ProjectFile>,
    index: HashMap<String, usize>,
    changes: Vec<ChangedFile>,
    change_index: HashMap<String, usize>,
    events: EventStream,
}

impl Overlay {
    pub fn new(root: impl Into<PathBuf>, events: EventStream) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
            index: HashMap::new(),
            changes: Vec::new(),
            change_index: HashMap::new(),
            events,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drops the snapshot and every pending edit.
    pub fn clear(&mut self) {
        self.files.clear();
        self.index.clear();
        self.changes.clear();
        self.change_index.clear();
    }

    /// Adds a file to the baseline snapshot. Re-inserting a path replaces it.
    pub fn insert_baseline(&mut self, mut file: ProjectFile) {
        file.path = normalize_path(&file.path);
        match self.index.get(&file.path) {
            Some(&idx) => self.files[idx] = file,
            None => {
                self.index.insert(file.path.clone(), self.files.len());
                self.files.push(file);
            }
        }
    }

    /// Baseline files in walk order.
    pub fn files(&self) -> &[ProjectFile] {
        &self.files
    }

    pub fn baseline(&self, path: &str) -> Option<&ProjectFile> {
        self.index.get(&normalize_path(path)).map(|&idx| &self.files[idx])
    }

    /// Pending edits that differ from their baseline, in walk order; files
    /// created during the run follow in creation order.
    pub fn changes(&self) -> Vec<&ChangedFile> {
        let mut changes: Vec<(usize, usize, &ChangedFile)> = self
            .changes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_net_change())
            .map(|(created, c)| {
                let walk = self.index.get(&c.path).copied().unwrap_or(usize::MAX);
                (walk, created, c)
            })
            .collect();
        changes.sort_by_key(|&(walk, created, _)| (walk, created));
        changes.into_iter().map(|(_, _, c)| c).collect()
    }

    pub fn change(&self, path: &str) -> Option<&ChangedFile> {
        self.change_index.get(&normalize_path(path)).map(|&idx| &self.changes[idx])
    }

    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(ChangedFile::is_net_change)
    }

    /// Publishes one file event per net change, diffed against the pre-run
    /// content. Yields after each event so subscribers running on the same
    /// thread drain the channel before it fills. Returns how many were published.
    pub async fn publish_changes(&self) -> usize {
        let changes = self.changes();
        for change in &changes {
            self.events.publish(UpdateEvent::file(change.path.clone(), change.diff()));
            pause(Duration::ZERO).await;
        }
        changes.len()
    }

    fn current(&self, path: &str) -> Option<&str> {
        match self.change_index.get(path) {
            Some(&idx) => {
                let change = &self.changes[idx];
                if !change.is_tombstone() {
                    Some(&change.content)
                } else if !change.is_net_change() && self.index.contains_key(path) {
                    // An empty file on disk that was "deleted" again is still there.
                    Some("")
                } else {
                    None
                }
            }
            None => self.index.get(path).map(|&idx| self.files[idx].content.as_str()),
        }
    }

    /// Commits every net change to disk, pausing `pacing` between operations.
    /// Tombstones delete the file; other edits create missing parent
    /// directories and overwrite the file. Pending edits are cleared once
    /// everything is written.
    pub async fn write_changes(&mut self, pacing: Duration) -> Result<WriteReport> {
        let mut report = WriteReport::default();
        for change in self.changes() {
            pause(pacing).await;
            let abs = self.root.join(&change.path);
            if change.is_tombstone() {
                match tokio::fs::remove_file(&abs).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::debug!(path = %change.path, "already removed");
                    }
                    Err(e) => return Err(UpdateError::io(abs, e)),
                }
                tracing::debug!(path = %change.path, "deleted");
                report.deleted.push(change.path.clone());
                continue;
            }
            if let Some(dir) = abs.parent() {
                if !tokio::fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
                    tokio::fs::create_dir_all(dir).await.map_err(|e| UpdateError::io(dir, e))?;
                }
            }
            tokio::fs::write(&abs, change.content.as_bytes())
                .await
                .map_err(|e| UpdateError::io(&abs, e))?;
            tracing::debug!(path = %change.path, bytes = change.content.len(), "written");
            report.written.push(change.path.clone());
        }
        self.changes.clear();
        self.change_index.clear();
        Ok(report)
    }
}

impl ProjectHost for Overlay {
    fn exists(&self, path: &str) -> bool {
        self.current(&normalize_path(path)).is_some()
    }

    fn read_dir(&self, path: &str, recursive: bool) -> Vec<String> {
        let dir = normalize_path(path);
        let dir = if dir == "." { String::new() } else { dir };
        let matches = |p: &str| {
            let parent = parent_dir(p);
            if recursive { is_within(parent, &dir) } else { parent == dir }
        };
        let baseline = self.files.iter().map(|f| f.path.as_str());
        let created = self
            .changes
            .iter()
            .filter(|c| !self.index.contains_key(&c.path))
            .map(|c| c.path.as_str());
        baseline
            .chain(created)
            .filter(|&p| matches(p) && self.current(p).is_some())
            .map(str::to_string)
            .collect()
    }

    fn read_file(&self, path: &str) -> Option<String> {
        self.current(&normalize_path(path)).map(str::to_string)
    }

    fn add_file(&mut self, path: &str, content: String) {
        let path = normalize_path(path);
        if let Some(&idx) = self.change_index.get(&path) {
            self.changes[idx].content = content;
            return;
        }
        let original = self.baseline(&path).map(|f| f.content.clone()).unwrap_or_default();
        if original == content {
            return;
        }
        tracing::debug!(path = %path, deleted = content.is_empty(), "pending edit");
        self.change_index.insert(path.clone(), self.changes.len());
        self.changes.push(ChangedFile { path, original, content });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn overlay(files: &[(&str, &str)]) -> Overlay {
        let mut overlay = Overlay::new("/project", EventStream::new(16));
        for (path, content) in files {
            overlay.insert_baseline(ProjectFile::new(*path, *content));
        }
        overlay
    }

    #[test]
    fn reads_fall_back_to_the_baseline() {
        let overlay = overlay(&[("src/a.ts", "a"), ("b.json", "{}")]);
        assert!(overlay.exists("src/a.ts"));
        assert!(!overlay.exists("src/missing.ts"));
        assert_eq!(overlay.read_file("b.json").as_deref(), Some("{}"));
        assert_eq!(overlay.read_file("missing"), None);
    }

    #[test]
    fn reads_observe_pending_edits() {
        let mut overlay = overlay(&[("a.txt", "foo\n"), ("b.txt", "x\n")]);
        overlay.add_file("a.txt", "bar\n".into());
        overlay.delete_file("b.txt");
        overlay.add_file("docs/new.md", "# new\n".into());

        assert_eq!(overlay.read_file("a.txt").as_deref(), Some("bar\n"));
        assert!(!overlay.exists("b.txt"));
        assert_eq!(overlay.read_file("docs/new.md").as_deref(), Some("# new\n"));
        assert_eq!(overlay.read_dir("", false), vec!["a.txt"]);
        assert_eq!(overlay.read_dir("docs", false), vec!["docs/new.md"]);
    }

    #[test]
    fn read_dir_lists_direct_or_recursive_children() {
        let overlay = overlay(&[
            ("README.md", ""),
            ("src/main.ts", ""),
            ("src/app/app.ts", ""),
            ("src2/other.ts", ""),
        ]);
        assert_eq!(overlay.read_dir("src", false), vec!["src/main.ts"]);
        assert_eq!(overlay.read_dir("src", true), vec!["src/main.ts", "src/app/app.ts"]);
        assert_eq!(overlay.read_dir(".", false), vec!["README.md"]);
        assert_eq!(overlay.read_dir("", true).len(), 4);
    }

    #[test]
    fn repeated_edits_keep_the_pre_run_content() {
        let mut overlay = overlay(&[("a.txt", "foo\n")]);
        overlay.add_file("a.txt", "bar\n".into());
        overlay.add_file("a.txt", "baz\n".into());

        let change = overlay.change("a.txt").unwrap();
        assert_eq!(change.original, "foo\n");
        assert_eq!(change.content, "baz\n");
        assert_eq!(overlay.changes().len(), 1);
        assert_eq!(change.diff(), "--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-foo\n+baz\n");
    }

    #[test]
    fn reverting_an_edit_leaves_no_net_change() {
        let mut overlay = overlay(&[("a.txt", "foo\n")]);
        overlay.add_file("a.txt", "bar\n".into());
        overlay.add_file("a.txt", "foo\n".into());

        assert!(!overlay.has_changes());
        assert_eq!(overlay.read_file("a.txt").as_deref(), Some("foo\n"));
    }

    #[test]
    fn unchanged_writes_create_no_pending_edit() {
        let mut overlay = overlay(&[("a.txt", "foo\n")]);
        overlay.add_file("a.txt", "foo\n".into());
        overlay.add_file("never.txt", String::new());
        assert!(overlay.change("a.txt").is_none());
        assert!(overlay.change("never.txt").is_none());
    }

    #[test]
    fn changes_follow_walk_order_then_creation_order() {
        let mut overlay = overlay(&[("a.txt", "a"), ("b.txt", "b")]);
        overlay.add_file("z-new.txt", "z".into());
        overlay.add_file("b.txt", "B".into());
        overlay.add_file("c-new.txt", "c".into());
        overlay.add_file("a.txt", "A".into());

        let order: Vec<&str> = overlay.changes().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(order, vec!["a.txt", "b.txt", "z-new.txt", "c-new.txt"]);
    }

    #[tokio::test]
    async fn publishes_one_event_per_net_change() {
        let mut overlay = overlay(&[("a.txt", "foo\n"), ("b.txt", "same\n")]);
        let mut rx = overlay.events.subscribe();
        overlay.add_file("a.txt", "bar\n".into());
        overlay.add_file("a.txt", "baz\n".into());
        overlay.add_file("b.txt", "same\n".into());

        assert_eq!(overlay.publish_changes().await, 1);
        let event = rx.try_recv().unwrap();
        let file = event.as_file().unwrap();
        assert_eq!(file.path, "a.txt");
        assert!(file.diff.contains("-foo"));
        assert!(file.diff.contains("+baz"));
        assert!(!file.diff.contains("bar"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn binary_files_are_flagged() {
        let file = ProjectFile::from_bytes("logo.png", vec![0x89, 0x50, 0xff, 0xfe]);
        assert!(file.binary);
        assert!(!ProjectFile::from_bytes("a.txt", b"text".to_vec()).binary);
    }

    #[tokio::test]
    async fn write_changes_writes_creates_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("keep.txt"), "keep\n").unwrap();
        std::fs::write(root.join("edit.txt"), "old\n").unwrap();
        std::fs::write(root.join("gone.txt"), "bye\n").unwrap();

        let mut overlay = Overlay::new(root, EventStream::default());
        for name in ["edit.txt", "gone.txt", "keep.txt"] {
            let content = std::fs::read_to_string(root.join(name)).unwrap();
            overlay.insert_baseline(ProjectFile::new(name, content));
        }
        overlay.add_file("edit.txt", "new\n".into());
        overlay.delete_file("gone.txt");
        overlay.add_file("nested/dir/created.txt", "hi\n".into());

        let report = overlay.write_changes(Duration::ZERO).await.unwrap();
        assert_eq!(report.written, vec!["edit.txt", "nested/dir/created.txt"]);
        assert_eq!(report.deleted, vec!["gone.txt"]);
        assert_eq!(std::fs::read_to_string(root.join("edit.txt")).unwrap(), "new\n");
        assert_eq!(std::fs::read_to_string(root.join("nested/dir/created.txt")).unwrap(), "hi\n");
        assert!(!root.join("gone.txt").exists());
        assert_eq!(std::fs::read_to_string(root.join("keep.txt")).unwrap(), "keep\n");
        assert!(!overlay.has_changes());
    }
}
