use similar::TextDiff;

const CONTEXT_LINES: usize = 3;

/// Unified diff of `before → after` for `path`.
///
/// A created file (empty `before`) or a removed file (empty `after`) gets a
/// git-style `diff --git` header with the matching `new`/`deleted file mode`
/// line. Returns an empty string when nothing changed.
pub fn unified_diff(path: &str, before: &str, after: &str) -> String {
    if before == after {
        return String::new();
    }
    let change = if before.is_empty() {
        Some("new")
    } else if after.is_empty() {
        Some("deleted")
    } else {
        None
    };

    let mut out = String::new();
    if let Some(change) = change {
        out.push_str(&format!("diff --git a/{path} b/{path}\n{change} file mode 100644\n"));
    }
    let diff = TextDiff::from_lines(before, after);
    out.push_str(
        &diff
            .unified_diff()
            .context_radius(CONTEXT_LINES)
            .header(&format!("a/{path}"), &format!("b/{path}"))
            .to_string(),
    );
    out
}
