//! Line-ending and indentation detection shared by the text-based formats.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Line ending of the host platform.
    pub fn platform() -> Self {
        if cfg!(windows) { LineEnding::CrLf } else { LineEnding::Lf }
    }

    /// Picks whichever of `\n` and `\r\n` occurs strictly more often in `src`.
    /// Ties, including a source without any line break, fall back to the
    /// platform default.
    pub fn detect(src: &str) -> Self {
        let crlf = src.matches("\r\n").count();
        let lf = src.matches('\n').count() - crlf;
        match lf.cmp(&crlf) {
            std::cmp::Ordering::Greater => LineEnding::Lf,
            std::cmp::Ordering::Less => LineEnding::CrLf,
            std::cmp::Ordering::Equal => LineEnding::platform(),
        }
    }
}

impl Default for LineEnding {
    fn default() -> Self {
        LineEnding::platform()
    }
}

/// Detects the indentation unit of `src`, e.g. `"  "` or `"\t"`.
///
/// Every non-blank line is compared with the previous indented line; the
/// width delta seen most often wins. Tabs and spaces are counted separately.
/// Returns `None` when no line is indented.
pub fn detect_indent(src: &str) -> Option<String> {
    let mut counts: HashMap<(bool, usize), usize> = HashMap::new();
    let mut previous: Option<(bool, usize)> = None;

    for line in src.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let width = line.len() - line.trim_start_matches([' ', '\t']).len();
        if width == 0 {
            previous = None;
            continue;
        }
        let tabs = line.starts_with('\t');
        let delta = match previous {
            Some((prev_tabs, prev_width)) if prev_tabs == tabs => width.abs_diff(prev_width),
            _ => width,
        };
        if delta > 0 {
            *counts.entry((tabs, delta)).or_default() += 1;
        }
        previous = Some((tabs, width));
    }

    counts
        .into_iter()
        // Highest count wins; ties prefer the narrower unit, then spaces.
        .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then(kb.1.cmp(&ka.1)).then(kb.0.cmp(&ka.0)))
        .map(|((tabs, width), _)| if tabs { "\t" } else { " " }.repeat(width))
}
