use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Looked up in the project root unless `--config` points elsewhere.
pub const CONFIG_FILE: &str = ".project-updater.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory names skipped in addition to `node_modules`.
    pub skip_dirs: Vec<String>,
    pub pacing: PacingConfig,
    pub on_error: OnError,
    /// Spaces per level for JSON files without any indentation.
    pub json_indent: Option<usize>,
    /// Regex overriding which paths count as plain text.
    pub text_pattern: Option<String>,
    /// Element HTML fragments are parsed inside of.
    pub markup_context: Option<String>,
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub file_ms: u64,
    pub plugin_ms: u64,
    pub phase_ms: u64,
    pub write_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnError {
    #[default]
    Abort,
    SkipFile,
}

/// A built-in transformation, selected by its `rule` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum RuleConfig {
    /// Rewrites TypeScript import specifiers equal to `from`.
    RenameImport { from: String, to: String },
    /// Sets the value at a JSON pointer in files whose path ends with `file`.
    JsonSet { file: String, pointer: String, value: serde_json::Value },
    /// Replaces `find` with `replace` on every line of matching text files.
    ReplaceText {
        #[serde(default)]
        pattern: Option<String>,
        find: String,
        replace: String,
    },
    RenameAttribute { from: String, to: String },
    /// Deletes files whose path matches `pattern`, whatever format claims them.
    /// Files no format claims are left alone.
    DeleteFiles { pattern: String },
}

pub fn load_config(config_path: &Path) -> anyhow::Result<ProjectConfig> {
    if !config_path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    let config: ProjectConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ProjectConfig::default());
    }

    #[test]
    fn parses_rules_and_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
skip_dirs: [dist]
on_error: skip-file
json_indent: 4
pacing:
  write_ms: 10
rules:
  - rule: rename-import
    from: "@angular/http"
    to: "@angular/common/http"
  - rule: json-set
    file: package.json
    pointer: /engines/node
    value: ">=18"
  - rule: delete-files
    pattern: "\\.spec\\.ts$"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.skip_dirs, vec!["dist"]);
        assert_eq!(config.on_error, OnError::SkipFile);
        assert_eq!(config.json_indent, Some(4));
        assert_eq!(config.pacing, PacingConfig { write_ms: 10, ..PacingConfig::default() });
        assert_eq!(
            config.rules,
            vec![
                RuleConfig::RenameImport { from: "@angular/http".into(), to: "@angular/common/http".into() },
                RuleConfig::JsonSet { file: "package.json".into(), pointer: "/engines/node".into(), value: json!(">=18") },
                RuleConfig::DeleteFiles { pattern: "\\.spec\\.ts$".into() },
            ]
        );
    }

    #[test]
    fn unknown_rules_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "rules:\n  - rule: format-everything\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse"));
    }
}
