use once_cell::sync::Lazy;
use regex::Regex;

use super::PathMatcher;
use crate::error::Result;
use crate::pipeline::DocumentFormat;
use crate::text::LineEnding;

/// Dotfiles and text-like extensions, or any path without a dot at all.
static DEFAULT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"((\.(browserlistrc|editorconfig|gitignore|yml|yaml|npmrc|nvmrc|js|mjs|md|txt|css|scss))|(^[^.]*))$",
    )
    .expect("valid default text pattern")
});

/// Plain text as a list of lines. Meant as the catch-all format, so register
/// it after every other one.
#[derive(Debug, Clone)]
pub struct TextFormat {
    matcher: PathMatcher,
    eol: LineEnding,
}

impl TextFormat {
    pub fn new() -> Self {
        Self { matcher: PathMatcher::Pattern(DEFAULT_PATTERN.clone()), eol: LineEnding::platform() }
    }

    pub fn with_matcher(mut self, matcher: PathMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Line ending detected in the last parsed file.
    pub fn line_ending(&self) -> LineEnding {
        self.eol
    }
}

impl Default for TextFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFormat for TextFormat {
    type Node = Vec<String>;

    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    fn parse(&mut self, src: &str, _path: &str) -> Result<Vec<String>> {
        self.eol = LineEnding::detect(src);
        if src.is_empty() {
            return Ok(Vec::new());
        }
        let eol = self.eol.as_str();
        let body = src.strip_suffix(eol).unwrap_or(src);
        Ok(body.split(eol).map(str::to_string).collect())
    }

    fn serialize(&mut self, node: &Vec<String>, _path: &str) -> Result<String> {
        let eol = self.eol.as_str();
        let mut out = node.join(eol);
        out.push_str(eol);
        Ok(out)
    }
}
