//! The four document formats: TypeScript syntax trees, HTML fragments, JSON
//! values and plain line arrays.

mod code;
mod json;
mod markup;
mod text;

use regex::Regex;

pub use code::{CodeFormat, ImportDeclaration, SourceProject, SourceUnit};
pub use json::JsonFormat;
pub use markup::{MarkupFormat, MarkupTree};
pub use text::TextFormat;

/// Decides which paths a format claims.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Path ends with one of these suffixes, e.g. `.json`.
    Extensions(Vec<String>),
    Pattern(Regex),
}

impl PathMatcher {
    pub fn extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PathMatcher::Extensions(extensions.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Extensions(exts) => exts.iter().any(|ext| path.ends_with(ext.as_str())),
            PathMatcher::Pattern(re) => re.is_match(path),
        }
    }
}
