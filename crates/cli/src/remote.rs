//! `pull`, `push` and `sync` with a progress spinner.

use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use gitstage_core::models::SyncMergeResult;
use gitstage_core::{GitBackend, Session};

use crate::style;

#[derive(Debug, Clone, Copy)]
pub enum RemoteOp {
    Pull,
    Push,
    Sync,
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .context("invalid spinner template")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

pub fn run(session: &mut Session<GitBackend>, op: RemoteOp) -> Result<()> {
    let label = match op {
        RemoteOp::Pull => "Pulling...",
        RemoteOp::Push => "Pushing...",
        RemoteOp::Sync => "Syncing...",
    };
    let progress = spinner(label)?;
    let mut on_line = |line: &str| {
        let line = line.trim();
        if !line.is_empty() {
            progress.set_message(line.to_string());
        }
    };

    let outcome = match op {
        RemoteOp::Pull => merge_outcome(session.pull(Some(&mut on_line)), "Pull"),
        RemoteOp::Sync => merge_outcome(session.sync(Some(&mut on_line)), "Sync"),
        RemoteOp::Push => session
            .push(Some(&mut on_line))
            .map(|()| "Push succeeded".to_string())
            .context("push failed"),
    };
    progress.finish_and_clear();

    let message = outcome?;
    println!("{}", style::success(&message));
    Ok(())
}

fn merge_outcome(result: SyncMergeResult, what: &str) -> Result<String> {
    match result {
        SyncMergeResult::Succeeded => Ok(format!("{} succeeded", what)),
        SyncMergeResult::Conflicts => {
            println!(
                "{}",
                style::warn("Merge left conflicts, run 'gitstage resolve --all' to resolve them")
            );
            anyhow::bail!("{} stopped with conflicts", what.to_lowercase())
        }
        SyncMergeResult::Error => anyhow::bail!("{} failed, run with RUST_LOG=info for details", what.to_lowercase()),
    }
}
