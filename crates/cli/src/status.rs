//! `status` and `show` output.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::json;

use gitstage_core::backend::Backend;
use gitstage_core::models::QuickView;
use gitstage_core::{GitBackend, Session};

use crate::style;

/// Print the change set as a table, or as JSON.
pub fn run_status(session: &Session<GitBackend>, as_json: bool) -> Result<()> {
    let branch = session.backend().active_branch().ok();
    let changes = session.changes();

    if as_json {
        let out = json!({
            "branch": branch,
            "changes_staged": changes.changes_staged(),
            "conflicts": changes.conflicts_exist(),
            "files": changes.file_states(),
        });
        let text = serde_json::to_string_pretty(&out).context("failed to serialize status")?;
        println!("{}", text);
        return Ok(());
    }

    println!();
    let branch_label = branch
        .as_deref()
        .map(|b| b.trim_start_matches("refs/heads/"))
        .unwrap_or("(detached)");
    println!("{}", style::header(&format!("On branch {}", branch_label)));
    println!();

    if !changes.changes_exist() {
        println!("{}", style::success("Working tree clean"));
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["File", "State", "Staged"]);

    for file in changes.file_states() {
        table.add_row(vec![
            Cell::new(&file.path),
            Cell::new(style::state_label(file.state)),
            Cell::new(if file.is_staged() { "yes" } else { "" }),
        ]);
    }

    println!("{}", table);
    println!();
    if changes.conflicts_exist() {
        println!(
            "{}",
            style::warn("Conflicts exist, run 'gitstage resolve --all' to resolve them")
        );
        println!();
    }
    Ok(())
}

/// Print the quick view of every change recorded for `path`.
pub fn run_show(session: &Session<GitBackend>, path: &str) -> Result<()> {
    let files: Vec<_> = session.changes().states_for(path).cloned().collect();
    if files.is_empty() {
        anyhow::bail!("no changes for '{}'", path);
    }

    for file in &files {
        println!();
        println!(
            "{} {}",
            style::header(&file.path),
            style::dim(&format!("({})", file.state))
        );
        println!("{}", "─".repeat(40));
        match session.quick_view(file) {
            Some(QuickView::Text(text)) => {
                for line in text.lines() {
                    println!("{}", style::diff_line(line));
                }
            }
            Some(view) => println!("{}", style::dim(&view.to_string())),
            None => anyhow::bail!("failed to render '{}'", file.path),
        }
    }
    println!();
    Ok(())
}
