//! Error types for the gitstage core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

use crate::models::StateTag;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Changes(#[from] ChangesError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Backend errors
// ---------------------------------------------------------------------------

/// Errors reported by the version-control backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// The repository is bare and has no working tree.
    #[error("git repository at '{0}' has no working directory")]
    NoWorkdir(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// The path has no entry in the index or in HEAD.
    #[error("no committed or staged version of '{0}'")]
    EntryNotFound(String),

    /// The path is not conflicted, or the requested side is absent.
    #[error("no '{side}' side recorded for conflicted path '{path}'")]
    ConflictSideMissing { path: String, side: String },

    /// HEAD is detached or unborn where a branch is required.
    #[error("no active branch: {0}")]
    NoActiveBranch(String),

    /// The `git` executable exited with a non-zero status.
    #[error("git {command} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Change-set operation errors
// ---------------------------------------------------------------------------

/// Errors from change-set mutations, sync and conflict resolution.
#[derive(Debug, Error)]
pub enum ChangesError {
    /// The file is in the wrong state for the requested operation.
    #[error("cannot {operation} '{path}': file is {state}")]
    InvalidState {
        path: String,
        state: StateTag,
        operation: &'static str,
    },

    /// The active branch has no upstream configured.
    #[error("branch '{branch}' is not tracking a remote")]
    NoUpstream { branch: String },

    /// A user-decision collaborator could not produce an answer.
    #[error("no answer from the user for '{0}'")]
    PromptUnavailable(String),

    /// The user reported an error while choosing a resolution.
    #[error("error trying to resolve '{0}'")]
    ResolutionError(String),

    /// Underlying backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// External merge or diff tool failure.
    #[error("external tool error: {0}")]
    Tool(#[from] ToolError),

    /// Working-tree file I/O.
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// External tool errors
// ---------------------------------------------------------------------------

/// Errors from launching external merge / diff tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool could not be started (is it installed?).
    #[error("failed to start '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but reported failure.
    #[error("'{program}' exited with status {code}")]
    ExitStatus { program: String, code: i32 },

    /// The tool was killed by a signal before reporting a status.
    #[error("'{0}' was terminated before exiting")]
    Terminated(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = BackendError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = ChangesError::InvalidState {
            path: "a.txt".into(),
            state: StateTag::RenamedInIndex,
            operation: "revert",
        };
        assert_eq!(
            err.to_string(),
            "cannot revert 'a.txt': file is renamed in index"
        );

        let err = ToolError::ExitStatus {
            program: "meld".into(),
            code: 2,
        };
        assert!(err.to_string().contains("status 2"));

        let err = ConfigError::InvalidValue {
            field: "merge_tool.path".into(),
            detail: "must not be empty".into(),
        };
        assert!(err.to_string().contains("merge_tool.path"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let backend_err = BackendError::EntryNotFound("x".into());
        let core_err: CoreError = backend_err.into();
        assert!(matches!(core_err, CoreError::Backend(_)));

        let changes_err: ChangesError = BackendError::NoActiveBranch("HEAD".into()).into();
        assert!(matches!(changes_err, ChangesError::Backend(_)));
        let core_err: CoreError = changes_err.into();
        assert!(matches!(core_err, CoreError::Changes(_)));
    }
}
