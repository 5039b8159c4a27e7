//! Shared data types used across gitstage.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// File states
// ---------------------------------------------------------------------------

/// Discrete change state of a path relative to HEAD, the index and the
/// working tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    ModifiedInWorkdir,
    ModifiedInIndex,
    NewInWorkdir,
    NewInIndex,
    DeletedFromWorkdir,
    DeletedFromIndex,
    RenamedInWorkdir,
    RenamedInIndex,
    TypeChangeInWorkdir,
    TypeChangeInIndex,
    Conflicted,
}

impl StateTag {
    /// Whether this state describes a change recorded in the index.
    ///
    /// A conflicted file occupies index slots but is never staged.
    pub fn is_staged(self) -> bool {
        match self {
            Self::ModifiedInIndex
            | Self::NewInIndex
            | Self::DeletedFromIndex
            | Self::RenamedInIndex
            | Self::TypeChangeInIndex => true,

            Self::ModifiedInWorkdir
            | Self::NewInWorkdir
            | Self::DeletedFromWorkdir
            | Self::RenamedInWorkdir
            | Self::TypeChangeInWorkdir
            | Self::Conflicted => false,
        }
    }

    /// Whether this state describes an unstaged working-tree change.
    pub fn is_unstaged(self) -> bool {
        !self.is_staged() && self != Self::Conflicted
    }
}

impl std::fmt::Display for StateTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModifiedInWorkdir => write!(f, "modified in workdir"),
            Self::ModifiedInIndex => write!(f, "modified in index"),
            Self::NewInWorkdir => write!(f, "new in workdir"),
            Self::NewInIndex => write!(f, "new in index"),
            Self::DeletedFromWorkdir => write!(f, "deleted from workdir"),
            Self::DeletedFromIndex => write!(f, "deleted from index"),
            Self::RenamedInWorkdir => write!(f, "renamed in workdir"),
            Self::RenamedInIndex => write!(f, "renamed in index"),
            Self::TypeChangeInWorkdir => write!(f, "type changed in workdir"),
            Self::TypeChangeInIndex => write!(f, "type changed in index"),
            Self::Conflicted => write!(f, "conflicted"),
        }
    }
}

/// A single path together with one of its change states.
///
/// A partially staged file appears twice in a change set, once per tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FileState {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    pub state: StateTag,
}

impl FileState {
    pub fn new(path: impl Into<String>, state: StateTag) -> Self {
        Self {
            path: path.into(),
            state,
        }
    }

    pub fn is_staged(&self) -> bool {
        self.state.is_staged()
    }
}

// ---------------------------------------------------------------------------
// Quick view
// ---------------------------------------------------------------------------

/// Human-viewable content for a changed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickView {
    /// The file is no longer on disk.
    Missing,
    /// Binary content is never rendered.
    Binary,
    /// A Git LFS pointer in place of the real content.
    LfsPointer { oid: String, size: u64 },
    /// Full text, or the hunks of a working-tree diff.
    Text(String),
}

impl std::fmt::Display for QuickView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "<< File Doesn't Exist >>"),
            Self::Binary => write!(f, "<< Binary File >>"),
            Self::LfsPointer { oid, size } => {
                write!(f, "<< Git LFS Object sha256:{} ({} bytes) >>", oid, size)
            }
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// One side of a conflicted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSide {
    /// The current branch.
    Ours,
    /// The incoming branch.
    Theirs,
}

impl std::fmt::Display for ConflictSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// The user's choice for resolving a conflicted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeFileResolution {
    Error,
    Cancel,
    UseTheirs,
    KeepMine,
    /// Open the configured merge tool. Not offered for binary files.
    RunMergeTool,
}

/// Whether the user accepts the working file as already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAcceptance {
    Yes,
    No,
}

/// Terminal outcome of one conflict resolution pass that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The merged content was written and staged.
    Resolved,
    /// Nothing changed and the user did not accept the file; it stays conflicted.
    Unresolved,
    /// The user cancelled before anything was written.
    Cancelled,
}

impl ResolveOutcome {
    /// Whether the working file was replaced and staged.
    pub fn was_modified(self) -> bool {
        self == Self::Resolved
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Classified result of a pull or sync.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMergeResult {
    Succeeded,
    Conflicts,
    Error,
}

impl std::fmt::Display for SyncMergeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Conflicts => write!(f, "conflicts"),
            Self::Error => write!(f, "error"),
        }
    }
}
