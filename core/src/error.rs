use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("The path {} is not a directory.", .0.display())]
    NotADirectory(PathBuf),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as {format}: {message}")]
    Parse {
        path: String,
        format: &'static str,
        message: String,
    },

    #[error("failed to serialize {path} as {format}: {message}")]
    Serialize {
        path: String,
        format: &'static str,
        message: String,
    },

    #[error("plugin #{index} failed on {path}: {source:#}")]
    Plugin {
        path: String,
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid edit of {path}: {message}")]
    InvalidEdit { path: String, message: String },
}

impl UpdateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdateError::Io { path: path.into(), source }
    }

    /// The project-relative path this error is about, when it concerns a single file.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            UpdateError::Parse { path, .. }
            | UpdateError::Serialize { path, .. }
            | UpdateError::Plugin { path, .. }
            | UpdateError::InvalidEdit { path, .. } => Some(path),
            UpdateError::NotADirectory(_) | UpdateError::Io { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_directory_message_names_the_path() {
        let err = UpdateError::NotADirectory(PathBuf::from("/tmp/missing"));
        assert_eq!(err.to_string(), "The path /tmp/missing is not a directory.");
        assert_eq!(err.file_path(), None);
    }

    #[test]
    fn plugin_error_keeps_the_cause_chain() {
        let err = UpdateError::Plugin {
            path: "src/app.ts".into(),
            index: 1,
            source: anyhow::anyhow!("boom").context("rewriting imports"),
        };
        assert_eq!(err.to_string(), "plugin #1 failed on src/app.ts: rewriting imports: boom");
        assert_eq!(err.file_path(), Some("src/app.ts"));
    }
}
