use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Result, bail};
use owo_colors::OwoColorize;
use updater_core::CancelHandle;
use updater_core::walk::read_dir_recursive;

use crate::util::{color_enabled_stdout, sym_gear};

/// Lists every file the update would visit and the format that claims it.
pub async fn handle_plan(path: String, config: Option<PathBuf>, skip_dir: Vec<String>) -> Result<()> {
    let root = PathBuf::from(&path);
    if !root.is_dir() {
        bail!("The path {} is not a directory.", root.display());
    }
    let config = super::resolve_config(&root, config.as_ref())?;
    let updater = super::build_updater(&root, &config, &skip_dir, CancelHandle::new())?;
    let files = read_dir_recursive(&root, &updater.options().skip_dirs).await?;

    let color = color_enabled_stdout();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for file in &files {
        let format = updater.updater_for(file).unwrap_or("-");
        *counts.entry(format).or_default() += 1;
        if color && format == "-" {
            println!("{:<8} {}", format.dimmed(), file.dimmed());
        } else {
            println!("{:<8} {}", format, file);
        }
    }

    let summary: Vec<String> = counts.iter().map(|(format, n)| format!("{format}: {n}")).collect();
    println!("{} {} files ({})", sym_gear(color), files.len(), summary.join(", "));
    Ok(())
}
