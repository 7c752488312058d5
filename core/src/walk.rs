//! Directory enumeration, project-relative path handling and run pacing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, UpdateError};

/// Turns an OS path fragment into the project form: forward slashes, no
/// leading `./`, no trailing slash.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches("./");
    path.trim_end_matches('/').to_string()
}

/// Directory part of a project-relative path; `""` for files at the root.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Whether `dir` is `base` or lies below it. `base` of `""` is the project root.
pub fn is_within(dir: &str, base: &str) -> bool {
    base.is_empty()
        || dir == base
        || (dir.len() > base.len() && dir.starts_with(base) && dir.as_bytes()[base.len()] == b'/')
}

/// Whether any segment of `path` is one of `skip_dirs`.
pub fn is_skipped(path: &str, skip_dirs: &[String]) -> bool {
    path.split('/').any(|segment| skip_dirs.iter().any(|s| s == segment))
}

/// Lists every file under `root`, depth first, entries within a directory in
/// name order. Directories named in `skip_dirs` are not entered. Returned
/// paths are relative to `root` and slash-separated.
pub async fn read_dir_recursive(root: &Path, skip_dirs: &[String]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    walk_dir(root, "", skip_dirs, &mut files).await?;
    Ok(files)
}

async fn walk_dir(dir: &Path, rel: &str, skip_dirs: &[String], files: &mut Vec<String>) -> Result<()> {
    let mut reader = tokio::fs::read_dir(dir).await.map_err(|e| UpdateError::io(dir, e))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(|e| UpdateError::io(dir, e))? {
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let child_rel = if rel.is_empty() { name.clone() } else { format!("{rel}/{name}") };
        let path: PathBuf = entry.path();
        let meta = tokio::fs::metadata(&path).await.map_err(|e| UpdateError::io(&path, e))?;
        if meta.is_dir() {
            if is_skipped(&child_rel, skip_dirs) {
                tracing::debug!(dir = %child_rel, "skipping directory");
                continue;
            }
            Box::pin(walk_dir(&path, &child_rel, skip_dirs, files)).await?;
        } else {
            files.push(child_rel);
        }
    }
    Ok(())
}

/// Yields to the runtime, sleeping for `delay` when it is non-zero.
pub async fn pause(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}
