use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use updater_core::{CancelHandle, FileEvent, ProgressKind, RunState, UpdateEvent};

use crate::util::{ask_confirm, color_enabled_stdout, colorize_diff, sym_check, sym_cross, sym_question};

pub struct UpdateArgs {
    pub path: String,
    pub config: Option<PathBuf>,
    pub skip_dir: Vec<String>,
    pub write: bool,
    pub yes: bool,
    pub json: bool,
}

/// What the renderer saw during a run.
#[derive(Default)]
struct RunReport {
    files: Vec<FileEvent>,
    last_title: Option<String>,
}

pub async fn handle_update(args: UpdateArgs) -> Result<()> {
    let root = PathBuf::from(&args.path);
    let config = super::resolve_config(&root, args.config.as_ref())?;
    let cancel = CancelHandle::new();
    let mut updater = super::build_updater(&root, &config, &args.skip_dir, cancel.clone())?;

    let rx = updater.subscribe();
    let (done_tx, done_rx) = watch::channel(false);
    let color = color_enabled_stdout();

    let run = async {
        let state = updater.update().await;
        let _ = done_tx.send(true);
        state
    };
    let render = render_events(rx, done_rx.clone(), args.json);
    let interrupt = cancel_on_ctrl_c(cancel, done_rx);
    let (state, report, ()) = tokio::join!(run, render, interrupt);

    if !args.json {
        for file in &report.files {
            print!("{}", colorize_diff(&file.diff, color));
        }
    }

    match state {
        RunState::Errored => {
            bail!("{}", report.last_title.unwrap_or_else(|| "update failed".to_string()));
        }
        RunState::Canceled => {
            if !args.json {
                println!("{} Update canceled, nothing written.", sym_cross(color));
            }
            return Ok(());
        }
        _ => {}
    }

    for skipped in updater.skipped() {
        tracing::warn!(path = %skipped.path, error = %skipped.error, "file skipped");
        if !args.json {
            println!("{} skipped {}: {}", sym_cross(color), skipped.path, skipped.error);
        }
    }

    let changed = updater.changes().len();
    if changed == 0 {
        if !args.json {
            println!("{} No changes.", sym_check(color));
        }
        return Ok(());
    }
    if !args.write {
        if !args.json {
            println!("{} {} file(s) would change. Run again with --write to apply.", sym_check(color), changed);
        }
        return Ok(());
    }

    if !args.yes {
        if args.json {
            bail!("--write together with --json needs --yes");
        }
        let prompt = format!("{} Write {} change(s) to {}? [y/N] ", sym_question(color), changed, root.display());
        if !ask_confirm(&prompt)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let written = updater.write_changes().await.context("failed to write changes")?;
    if args.json {
        println!("{}", json!({ "type": "write", "written": written.written, "deleted": written.deleted }));
    } else {
        println!(
            "{} Wrote {} file(s), deleted {}.",
            sym_check(color),
            written.written.len(),
            written.deleted.len()
        );
    }
    Ok(())
}

/// Shows progress until the run signals `done`, then drains what is left.
/// With `json` every event is printed as one JSON line instead.
async fn render_events(
    mut rx: broadcast::Receiver<UpdateEvent>,
    mut done: watch::Receiver<bool>,
    json: bool,
) -> RunReport {
    let mut report = RunReport::default();
    let pb = if json { ProgressBar::hidden() } else { ProgressBar::new(1000) };
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}") {
        pb.set_style(style.progress_chars("=>-"));
    }

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => handle_event(event, &pb, json, &mut report),
                Err(broadcast::error::RecvError::Lagged(n)) => tracing::warn!(missed = n, "progress display fell behind"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    break;
                }
            }
        }
    }
    loop {
        match rx.try_recv() {
            Ok(event) => handle_event(event, &pb, json, &mut report),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "progress display fell behind")
            }
            Err(_) => break,
        }
    }
    pb.finish_and_clear();
    report
}

fn handle_event(event: UpdateEvent, pb: &ProgressBar, json: bool, report: &mut RunReport) {
    if json {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode event"),
        }
    }
    match event {
        UpdateEvent::Progress(progress) => {
            if progress.kind == ProgressKind::Determinate {
                pb.set_position((progress.progress * 1000.0).round() as u64);
            }
            pb.set_message(progress.title.clone());
            report.last_title = Some(progress.title);
        }
        UpdateEvent::File(file) => report.files.push(file),
    }
}

async fn cancel_on_ctrl_c(cancel: CancelHandle, mut done: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    tracing::info!("interrupt received, canceling");
                    cancel.cancel();
                }
                return;
            }
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    return;
                }
            }
        }
    }
}
