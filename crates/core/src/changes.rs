//! The change set: every current [`FileState`] of a repository.
//!
//! A change set is never patched. Every mutation goes to the backend first
//! and the set is rebuilt from the backend's status afterwards.

use std::path::Path;

use tracing::debug;

use crate::backend::StatusEntry;
use crate::models::{FileState, StateTag};
use crate::status::classify_entry;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    file_states: Vec<FileState>,
    changes_staged: bool,
}

impl ChangeSet {
    /// Build a change set from a status snapshot, skipping the reserved
    /// per-repository settings file.
    pub fn from_statuses(entries: &[StatusEntry], workdir: &Path, settings_filename: &str) -> Self {
        let mut file_states = Vec::new();
        let mut changes_staged = false;

        for entry in entries {
            if entry.path == settings_filename {
                continue;
            }
            changes_staged |= classify_entry(workdir, &entry.path, entry.status, &mut file_states);
        }

        if file_states.is_empty() {
            debug!("no changes");
        }

        Self {
            file_states,
            changes_staged,
        }
    }

    /// All entries in backend order.
    pub fn file_states(&self) -> &[FileState] {
        &self.file_states
    }

    pub fn len(&self) -> usize {
        self.file_states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_states.is_empty()
    }

    pub fn changes_exist(&self) -> bool {
        !self.file_states.is_empty()
    }

    /// Whether any status entry carried an index bit.
    pub fn changes_staged(&self) -> bool {
        self.changes_staged
    }

    pub fn files_are_staged(&self) -> bool {
        self.file_states.iter().any(|s| s.state.is_staged())
    }

    pub fn files_are_unstaged(&self) -> bool {
        self.file_states.iter().any(|s| s.state.is_unstaged())
    }

    pub fn conflicts_exist(&self) -> bool {
        self.file_states
            .iter()
            .any(|s| s.state == StateTag::Conflicted)
    }

    /// Conflicted entries in their existing order.
    pub fn conflicted(&self) -> impl Iterator<Item = &FileState> {
        self.file_states
            .iter()
            .filter(|s| s.state == StateTag::Conflicted)
    }

    /// Every entry for `path`.
    pub fn states_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a FileState> + 'a {
        self.file_states.iter().filter(move |s| s.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Status;

    fn build(entries: &[StatusEntry]) -> ChangeSet {
        ChangeSet::from_statuses(entries, Path::new("/nonexistent"), ".gitstage-user.toml")
    }

    #[test]
    fn test_empty_status_is_empty_set() {
        let set = build(&[]);
        assert!(set.is_empty());
        assert!(!set.changes_exist());
        assert!(!set.changes_staged());
        assert!(!set.files_are_staged());
        assert!(!set.files_are_unstaged());
    }

    #[test]
    fn test_settings_file_never_listed() {
        let set = build(&[
            StatusEntry::new(".gitstage-user.toml", Status::WT_NEW),
            StatusEntry::new("nested/.gitstage-user.toml", Status::WT_NEW),
        ]);
        assert_eq!(
            set.file_states(),
            &[FileState::new("nested/.gitstage-user.toml", StateTag::NewInWorkdir)]
        );
    }

    #[test]
    fn test_ignored_only_means_no_changes() {
        let set = build(&[StatusEntry::new("target/out.o", Status::IGNORED)]);
        assert!(!set.changes_exist());
    }

    #[test]
    fn test_index_only_file() {
        let set = build(&[StatusEntry::new("a.txt", Status::INDEX_MODIFIED)]);
        assert!(set.changes_staged());
        assert!(set.files_are_staged());
        assert!(!set.files_are_unstaged());
        assert!(set.states_for("a.txt").all(|s| s.is_staged()));
    }

    #[test]
    fn test_partially_staged_file_listed_twice() {
        let set = build(&[
            StatusEntry::new("a.txt", Status::WT_MODIFIED | Status::INDEX_MODIFIED),
            StatusEntry::new("b.txt", Status::WT_NEW),
        ]);
        let tags: Vec<StateTag> = set.states_for("a.txt").map(|s| s.state).collect();
        assert_eq!(tags, vec![StateTag::ModifiedInWorkdir, StateTag::ModifiedInIndex]);
        assert!(set.changes_staged());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_conflicted_entries_keep_order() {
        let set = build(&[
            StatusEntry::new("z.txt", Status::CONFLICTED),
            StatusEntry::new("m.txt", Status::WT_MODIFIED),
            StatusEntry::new("a.txt", Status::CONFLICTED),
        ]);
        let paths: Vec<&str> = set.conflicted().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["z.txt", "a.txt"]);
        assert!(set.conflicts_exist());
        assert!(!set.changes_staged());
    }

    #[test]
    fn test_rebuild_is_structurally_identical() {
        let entries = vec![
            StatusEntry::new("a.txt", Status::WT_MODIFIED | Status::INDEX_MODIFIED),
            StatusEntry::new("c.bin", Status::INDEX_NEW),
        ];
        assert_eq!(build(&entries), build(&entries));
    }
}
