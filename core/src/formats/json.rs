use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};

use super::PathMatcher;
use crate::error::{Result, UpdateError};
use crate::pipeline::DocumentFormat;
use crate::text::{LineEnding, detect_indent};

const DEFAULT_INDENT: &str = "  ";

/// JSON documents as [`serde_json::Value`]. Key order, the indentation unit
/// and the line ending of the source survive a round trip.
#[derive(Debug, Clone)]
pub struct JsonFormat {
    matcher: PathMatcher,
    default_indent: String,
    indent: String,
    eol: LineEnding,
}

impl JsonFormat {
    pub fn new() -> Self {
        Self {
            matcher: PathMatcher::extensions([".json"]),
            default_indent: DEFAULT_INDENT.to_string(),
            indent: DEFAULT_INDENT.to_string(),
            eol: LineEnding::platform(),
        }
    }

    /// Indentation used for sources without any indented line.
    pub fn with_default_indent(mut self, indent: impl Into<String>) -> Self {
        self.default_indent = indent.into();
        self.indent = self.default_indent.clone();
        self
    }

    pub fn with_matcher(mut self, matcher: PathMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Indentation detected in the last parsed file.
    pub fn last_indent(&self) -> &str {
        &self.indent
    }

    pub fn line_ending(&self) -> LineEnding {
        self.eol
    }
}

impl Default for JsonFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentFormat for JsonFormat {
    type Node = Value;

    fn name(&self) -> &'static str {
        "json"
    }

    fn supports(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    fn parse(&mut self, src: &str, path: &str) -> Result<Value> {
        self.indent = detect_indent(src).unwrap_or_else(|| self.default_indent.clone());
        self.eol = LineEnding::detect(src);
        serde_json::from_str(src).map_err(|e| UpdateError::Parse {
            path: path.to_string(),
            format: "json",
            message: e.to_string(),
        })
    }

    fn serialize(&mut self, node: &Value, path: &str) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(self.indent.as_bytes());
        let mut ser = Serializer::with_formatter(&mut buf, formatter);
        node.serialize(&mut ser).map_err(|e| UpdateError::Serialize {
            path: path.to_string(),
            format: "json",
            message: e.to_string(),
        })?;
        let text = String::from_utf8(buf).map_err(|e| UpdateError::Serialize {
            path: path.to_string(),
            format: "json",
            message: e.to_string(),
        })?;
        // Newlines inside strings are escaped, so every raw '\n' is structural.
        let mut out = match self.eol {
            LineEnding::Lf => text,
            LineEnding::CrLf => text.replace('\n', "\r\n"),
        };
        out.push_str(self.eol.as_str());
        Ok(out)
    }
}
