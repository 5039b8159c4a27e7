//! Capability interface over the version-control backend.
//!
//! The change set, sync orchestrator and conflict engine only talk to the
//! repository through [`Backend`]. [`crate::git::GitBackend`] is the git2
//! implementation; tests substitute an in-memory fake.

use std::io;
use std::path::{Path, PathBuf};

use git2::Status;

use crate::errors::BackendError;
use crate::models::ConflictSide;

/// One `(path, status bits)` pair reported by the status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
    pub status: Status,
}

impl StatusEntry {
    pub fn new(path: impl Into<String>, status: Status) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// Content of the indexed (or committed) version of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobContent {
    pub is_binary: bool,
    pub content: Vec<u8>,
}

/// Per-line progress sink for long-running remote operations.
pub type LineCallback<'a> = &'a mut dyn FnMut(&str);

/// Reborrow an optional callback for one nested call so `status` can be
/// handed on again afterwards.
pub(crate) fn reborrow<'s>(status: &'s mut Option<LineCallback<'_>>) -> Option<LineCallback<'s>> {
    status
        .as_mut()
        .map(|callback| &mut **callback as LineCallback<'s>)
}

/// Create an empty file named `<file>.<label>.<random>` next to `full_path`
/// and return its path. An existing file is never reused.
pub(crate) fn create_beside(full_path: &Path, label: &str) -> io::Result<PathBuf> {
    let dir = full_path.parent().unwrap_or_else(|| Path::new("."));
    let name = full_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = format!("{}.{}.", name, label);
    let (_, path) = tempfile::Builder::new()
        .prefix(&prefix)
        .rand_bytes(6)
        .tempfile_in(dir)?
        .keep()?;
    Ok(path)
}

/// Queries and mutations the core needs from a repository.
pub trait Backend {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    // -- status & content ---------------------------------------------------

    /// Every changed path in the working tree and index.
    fn statuses(&self) -> Result<Vec<StatusEntry>, BackendError>;

    /// The index version of `path`, falling back to HEAD.
    fn blob(&self, path: &str) -> Result<BlobContent, BackendError>;

    /// Unified diff between the index and the working copy of `path`.
    fn diff_workdir(&self, path: &str) -> Result<String, BackendError>;

    /// Whether `path` exists in the tree of HEAD.
    fn is_committed(&self, path: &str) -> Result<bool, BackendError>;

    // -- index & history mutations -----------------------------------------

    fn stage(&self, path: &str) -> Result<(), BackendError>;

    fn unstage(&self, path: &str) -> Result<(), BackendError>;

    /// Discard every staged and unstaged change to tracked files.
    fn revert_all(&self) -> Result<(), BackendError>;

    /// Restore `path` in the index and working tree from `branch`.
    fn revert_file(&self, branch: &str, path: &str) -> Result<(), BackendError>;

    /// Commit the index; returns the new commit id. Completes a pending
    /// merge when one is in progress.
    fn commit(&self, message: &str) -> Result<String, BackendError>;

    /// Whether a merge is waiting to be committed.
    fn is_merging(&self) -> Result<bool, BackendError>;

    // -- conflicts ----------------------------------------------------------

    fn conflicted_paths(&self) -> Result<Vec<String>, BackendError>;

    /// Write one side of a conflicted path to a new file next to it; returns
    /// the absolute path.
    fn save_conflicted_variant(
        &self,
        path: &str,
        side: ConflictSide,
    ) -> Result<PathBuf, BackendError>;

    /// Write the HEAD version of `path` to a new file next to it; returns the
    /// absolute path.
    fn save_original_version(&self, path: &str) -> Result<PathBuf, BackendError>;

    // -- branches & remotes -------------------------------------------------

    /// Full reference name of the checked-out branch.
    fn active_branch(&self) -> Result<String, BackendError>;

    /// Whether the checked-out branch has an upstream configured.
    fn is_branch_tracking(&self) -> Result<bool, BackendError>;

    /// Pull from the upstream. Output lines are delivered in emission order.
    fn pull(&self, on_line: LineCallback<'_>) -> Result<(), BackendError>;

    /// Push to the upstream. Output lines are delivered in emission order.
    fn push(&self, on_line: LineCallback<'_>) -> Result<(), BackendError>;
}
