pub mod plan;
pub mod rules;
pub mod update;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use updater_core::formats::PathMatcher;
use updater_core::{
    CancelHandle, CodeFormat, ErrorPolicy, JsonFormat, MarkupFormat, ProjectUpdater, TextFormat, UpdateOptions,
    Updater,
};

use crate::config::{CONFIG_FILE, OnError, ProjectConfig, load_config};

/// Config file named by `--config`, or the one in the project root.
pub fn resolve_config(root: &Path, config: Option<&PathBuf>) -> Result<ProjectConfig> {
    let path = config.cloned().unwrap_or_else(|| root.join(CONFIG_FILE));
    load_config(&path)
}

/// Wires the four formats, in priority order, with the configured rules.
pub fn build_updater(
    root: &Path,
    config: &ProjectConfig,
    extra_skip_dirs: &[String],
    cancel: CancelHandle,
) -> Result<ProjectUpdater> {
    let rules = rules::compile(&config.rules).context("invalid rules in config")?;
    tracing::debug!(rules = rules.len(), "rules compiled");
    let plugin_pacing = Duration::from_millis(config.pacing.plugin_ms);

    let mut json = JsonFormat::new();
    if let Some(width) = config.json_indent {
        json = json.with_default_indent(" ".repeat(width));
    }
    let mut markup = MarkupFormat::new();
    if let Some(context) = &config.markup_context {
        markup = markup.with_context(context.clone());
    }
    let text = match &config.text_pattern {
        Some(pattern) => {
            let re = Regex::new(pattern).with_context(|| format!("invalid text_pattern {pattern:?}"))?;
            TextFormat::new().with_matcher(PathMatcher::Pattern(re))
        }
        None => TextFormat::new(),
    };

    let mut options = UpdateOptions {
        file_pacing: Duration::from_millis(config.pacing.file_ms),
        phase_pause: Duration::from_millis(config.pacing.phase_ms),
        write_pacing: Duration::from_millis(config.pacing.write_ms),
        error_policy: match config.on_error {
            OnError::Abort => ErrorPolicy::Abort,
            OnError::SkipFile => ErrorPolicy::SkipFile,
        },
        ..UpdateOptions::default()
    };
    for dir in config.skip_dirs.iter().chain(extra_skip_dirs) {
        if !options.skip_dirs.contains(dir) {
            options.skip_dirs.push(dir.clone());
        }
    }

    Ok(ProjectUpdater::builder(root)
        .options(options)
        .cancel_handle(cancel)
        .updater(Updater::new(CodeFormat::new()).with_plugins(rules.code).with_pacing(plugin_pacing))
        .updater(Updater::new(markup).with_plugins(rules.markup).with_pacing(plugin_pacing))
        .updater(Updater::new(json).with_plugins(rules.json).with_pacing(plugin_pacing))
        .updater(Updater::new(text).with_plugins(rules.text).with_pacing(plugin_pacing))
        .build())
}
