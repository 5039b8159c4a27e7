//! gitstage command-line tool.
//!
//! Lists working-tree and index changes, stages and reverts them, commits,
//! syncs with the upstream branch and walks the user through resolving merge
//! conflicts.

mod prompt;
mod remote;
mod status;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitstage_core::models::{FileState, ResolveOutcome, StateTag};
use gitstage_core::{AppConfig, ChangeSet, GitBackend, Session};

use prompt::TerminalPrompter;
use remote::RemoteOp;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// gitstage command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "gitstage",
    version,
    about = "Inspect, stage and sync working-tree changes and resolve merge conflicts"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository to operate on (any path inside it).
    #[arg(short = 'C', long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every changed file and its state.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a quick view of the changes to a file.
    Show {
        path: String,
    },

    /// Stage files.
    Stage {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Unstage files.
    Unstage {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Revert a modified or deleted file, or every change with --all.
    Revert {
        #[arg(long, conflicts_with = "path")]
        all: bool,

        #[arg(required_unless_present = "all")]
        path: Option<String>,
    },

    /// Delete an untracked file, or every untracked file.
    Clean {
        path: Option<String>,
    },

    /// Commit staged changes.
    Commit {
        #[arg(short, long)]
        message: String,
    },

    /// Pull from the upstream branch.
    Pull,

    /// Push to the upstream branch.
    Push,

    /// Pull, then push if the pull succeeded.
    Sync,

    /// Resolve a conflicted file, or every conflicted file with --all.
    Resolve {
        #[arg(long, conflicts_with = "path")]
        all: bool,

        #[arg(required_unless_present = "all")]
        path: Option<String>,
    },

    /// Open the configured diff tool on a modified file.
    Diff {
        path: String,
    },

    /// Write a default configuration file.
    InitConfig {
        /// Output path (defaults to the user configuration directory).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::InitConfig { output } = &cli.command {
        init_logging("warn");
        return cmd_init_config(output.as_deref());
    }

    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    init_logging(&config.logging.level);

    let backend = GitBackend::open(&cli.repo).context("failed to open repository")?;
    let mut session = Session::new(backend, config);
    session
        .refresh()
        .context("failed to read repository status")?;

    match cli.command {
        Commands::Status { json } => status::run_status(&session, json),
        Commands::Show { path } => status::run_show(&session, &path),
        Commands::Stage { paths } => cmd_stage(&mut session, &paths),
        Commands::Unstage { paths } => cmd_unstage(&mut session, &paths),
        Commands::Revert { all, path } => cmd_revert(&mut session, all, path.as_deref()),
        Commands::Clean { path } => cmd_clean(&mut session, path.as_deref()),
        Commands::Commit { message } => cmd_commit(&mut session, &message),
        Commands::Pull => remote::run(&mut session, RemoteOp::Pull),
        Commands::Push => remote::run(&mut session, RemoteOp::Push),
        Commands::Sync => remote::run(&mut session, RemoteOp::Sync),
        Commands::Resolve { all, path } => cmd_resolve(&mut session, all, path.as_deref()),
        Commands::Diff { path } => cmd_diff(&session, &path),
        Commands::InitConfig { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The first change recorded for `path` that satisfies `wanted`, falling
/// back to any change for `path` so the core can report why it is refused.
fn find_change(
    changes: &ChangeSet,
    path: &str,
    wanted: impl Fn(&FileState) -> bool,
) -> Result<FileState> {
    let mut candidates = changes.states_for(path);
    let first = candidates
        .next()
        .cloned()
        .with_context(|| format!("no changes for '{}'", path))?;
    if wanted(&first) {
        return Ok(first);
    }
    Ok(candidates.find(|f| wanted(f)).cloned().unwrap_or(first))
}

/// A commit needs staged changes or a pending merge, and no conflicts.
fn ensure_committable(changes: &ChangeSet, merging: bool) -> Result<()> {
    if changes.conflicts_exist() {
        anyhow::bail!("conflicts exist, resolve them before committing");
    }
    if !changes.changes_staged() && !merging {
        anyhow::bail!("nothing staged to commit");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_stage(session: &mut Session<GitBackend>, paths: &[String]) -> Result<()> {
    for path in paths {
        let file = find_change(session.changes(), path, |f| !f.is_staged())?;
        if file.is_staged() {
            anyhow::bail!("'{}' has no unstaged changes", path);
        }
        session
            .stage_file(&file, false)
            .with_context(|| format!("failed to stage '{}'", path))?;
        println!("{}", style::success(&format!("Staged {}", path)));
    }
    session.refresh().context("failed to refresh status")?;
    Ok(())
}

fn cmd_unstage(session: &mut Session<GitBackend>, paths: &[String]) -> Result<()> {
    for path in paths {
        let file = find_change(session.changes(), path, FileState::is_staged)?;
        if !file.is_staged() {
            anyhow::bail!("'{}' has no staged changes", path);
        }
        session
            .unstage_file(&file, false)
            .with_context(|| format!("failed to unstage '{}'", path))?;
        println!("{}", style::success(&format!("Unstaged {}", path)));
    }
    session.refresh().context("failed to refresh status")?;
    Ok(())
}

fn cmd_revert(session: &mut Session<GitBackend>, all: bool, path: Option<&str>) -> Result<()> {
    if all {
        session.revert_all().context("failed to revert changes")?;
        println!("{}", style::success("Reverted all changes"));
        return Ok(());
    }

    let path = path.context("a path or --all is required")?;
    let file = find_change(session.changes(), path, |f| {
        matches!(
            f.state,
            StateTag::ModifiedInWorkdir
                | StateTag::ModifiedInIndex
                | StateTag::DeletedFromWorkdir
                | StateTag::DeletedFromIndex
        )
    })?;
    session
        .revert_file(&file)
        .with_context(|| format!("failed to revert '{}'", path))?;
    println!("{}", style::success(&format!("Reverted {}", path)));
    Ok(())
}

fn cmd_clean(session: &mut Session<GitBackend>, path: Option<&str>) -> Result<()> {
    match path {
        Some(path) => {
            let file = find_change(session.changes(), path, |f| f.state == StateTag::NewInWorkdir)?;
            session
                .delete_untracked_file(&file, true)
                .with_context(|| format!("failed to delete '{}'", path))?;
            println!("{}", style::success(&format!("Deleted {}", path)));
        }
        None => {
            let count = session
                .file_changes()
                .iter()
                .filter(|f| f.state == StateTag::NewInWorkdir)
                .count();
            session
                .delete_untracked_files(true)
                .context("failed to delete untracked files")?;
            println!(
                "{}",
                style::success(&format!("Deleted {} untracked file(s)", count))
            );
        }
    }
    Ok(())
}

fn cmd_commit(session: &mut Session<GitBackend>, message: &str) -> Result<()> {
    ensure_committable(session.changes(), session.merge_in_progress())?;
    let id = session
        .commit_staged_changes(message)
        .context("failed to commit")?;
    let short = &id[..7.min(id.len())];
    println!("{}", style::success(&format!("Committed {}", short)));
    Ok(())
}

fn cmd_resolve(session: &mut Session<GitBackend>, all: bool, path: Option<&str>) -> Result<()> {
    let mut prompter = TerminalPrompter;

    if all {
        if !session.changes().conflicts_exist() {
            println!("{}", style::success("No conflicts"));
            return Ok(());
        }
        let resolved = session
            .resolve_all_conflicts(&mut prompter, true)
            .context("failed to resolve conflicts")?;
        if resolved {
            println!("{}", style::success("All conflicts resolved"));
        } else {
            let remaining = session.changes().conflicted().count();
            println!(
                "{}",
                style::warn(&format!("{} conflicted file(s) remain", remaining))
            );
        }
        return Ok(());
    }

    let path = path.context("a path or --all is required")?;
    let file = find_change(session.changes(), path, |f| f.state == StateTag::Conflicted)?;
    let outcome = session
        .resolve_conflict(&file, &mut prompter, true)
        .with_context(|| format!("failed to resolve '{}'", path))?;
    match outcome {
        ResolveOutcome::Resolved => {
            println!("{}", style::success(&format!("Resolved {}", path)));
        }
        ResolveOutcome::Unresolved => {
            println!("{}", style::warn(&format!("{} is still conflicted", path)));
        }
        ResolveOutcome::Cancelled => {
            println!("{}", style::warn("Cancelled"));
        }
    }
    Ok(())
}

fn cmd_diff(session: &Session<GitBackend>, path: &str) -> Result<()> {
    let file = find_change(session.changes(), path, |f| {
        matches!(
            f.state,
            StateTag::ModifiedInWorkdir | StateTag::ModifiedInIndex
        )
    })?;
    session
        .open_diff_tool(&file)
        .with_context(|| format!("failed to open diff tool for '{}'", path))
}

fn cmd_init_config(output: Option<&Path>) -> Result<()> {
    let default_config = r#"# gitstage configuration

[logging]
# Overridden by RUST_LOG when set.
level = "warn"

[merge_tool]
# meld | kdiff3 | p4merge | diffmerge
kind = "meld"
# path = "/usr/bin/meld"

[repository]
# Per-repository settings file. Never listed as a change, and removed
# before a pull when it was never committed.
settings_filename = ".gitstage-user.toml"
"#;

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => AppConfig::default_path().context("no user configuration directory")?,
    };

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).context("failed to create configuration directory")?;
    }

    std::fs::write(&output, default_config).context("failed to write config file")?;
    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    Ok(())
}
