//! Launching external merge and diff tools.
//!
//! Tools run synchronously: the caller blocks until the process exits. There
//! is no timeout.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info, instrument};

use crate::config::MergeToolKind;
use crate::errors::ToolError;

/// Runs an external program to completion.
pub trait ToolLauncher {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), ToolError>;
}

/// Launches real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ToolLauncher for ProcessLauncher {
    #[instrument(skip(self, args), fields(program = %program.display()))]
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), ToolError> {
        info!("starting external tool");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| ToolError::SpawnFailed {
                program: program.display().to_string(),
                source,
            })?;

        match status.code() {
            Some(0) => {
                debug!("external tool exited cleanly");
                Ok(())
            }
            Some(code) => Err(ToolError::ExitStatus {
                program: program.display().to_string(),
                code,
            }),
            None => Err(ToolError::Terminated(program.display().to_string())),
        }
    }
}

/// Argument list for a three-way merge in the order `kind` expects.
pub fn merge_args(kind: MergeToolKind, ours: &Path, base: &Path, theirs: &Path) -> Vec<OsString> {
    let paths: Vec<&Path> = match kind {
        MergeToolKind::Meld | MergeToolKind::KDiff3 | MergeToolKind::DiffMerge => {
            vec![ours, base, theirs]
        }
        // p4merge takes the output file last.
        MergeToolKind::P4Merge => vec![base, ours, theirs, base],
    };
    paths.into_iter().map(|p| p.as_os_str().to_owned()).collect()
}

/// Argument list for a two-way diff.
pub fn diff_args(original: &Path, working: &Path) -> Vec<OsString> {
    vec![original.as_os_str().to_owned(), working.as_os_str().to_owned()]
}
