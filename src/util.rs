use std::io::{self, Write};

use owo_colors::OwoColorize;
use supports_color::Stream;

pub fn color_enabled_stdout() -> bool {
    supports_color::on(Stream::Stdout).is_some()
}

pub fn sym_check(enabled: bool) -> String {
    if enabled { format!("{}", "✔".green().bold()) } else { "✔".to_string() }
}

pub fn sym_cross(enabled: bool) -> String {
    if enabled { format!("{}", "✖".red().bold()) } else { "x".to_string() }
}

pub fn sym_question(enabled: bool) -> String {
    if enabled { format!("{}", "?".cyan().bold()) } else { "?".to_string() }
}

pub fn sym_gear(enabled: bool) -> String {
    if enabled { format!("{}", "⚙".blue().bold()) } else { "⚙".to_string() }
}

/// Colors a unified diff line by line: headers bold, hunks cyan, additions
/// green, removals red.
pub fn colorize_diff(diff: &str, enabled: bool) -> String {
    if !enabled {
        return diff.to_string();
    }
    let mut out = String::with_capacity(diff.len());
    for line in diff.split_inclusive('\n') {
        let (text, nl) = match line.strip_suffix('\n') {
            Some(text) => (text, "\n"),
            None => (line, ""),
        };
        let colored = if text.starts_with("+++") || text.starts_with("---") || text.starts_with("diff --git") {
            text.bold().to_string()
        } else if text.starts_with("@@") {
            text.cyan().to_string()
        } else if text.starts_with('+') {
            text.green().to_string()
        } else if text.starts_with('-') {
            text.red().to_string()
        } else if text.ends_with("file mode 100644") {
            text.dimmed().to_string()
        } else {
            text.to_string()
        };
        out.push_str(&colored);
        out.push_str(nl);
    }
    out
}

pub fn ask_confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    let ans = buf.trim().to_lowercase();
    Ok(ans == "y" || ans == "yes")
}
