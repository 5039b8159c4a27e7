//! A repository session: the backend, the current change set and every
//! user-facing operation on them.
//!
//! Operations are serialized by `&mut self`; one session drives one
//! repository at a time.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, error, info, instrument, warn};

use crate::backend::Backend;
use crate::changes::ChangeSet;
use crate::config::AppConfig;
use crate::conflict::resolver::TempFiles;
use crate::conflict::tool::diff_args;
use crate::conflict::{ConflictPrompter, ConflictResolver, ProcessLauncher, ToolLauncher};
use crate::errors::ChangesError;
use crate::models::{FileState, QuickView, ResolveOutcome, StateTag};
use crate::quick_view;
use crate::sync::SyncState;

pub struct Session<B: Backend> {
    backend: B,
    config: AppConfig,
    changes: ChangeSet,
    pub(crate) sync_state: SyncState,
    launcher: Box<dyn ToolLauncher>,
}

impl<B: Backend> Session<B> {
    /// Create a session with an empty change set. Call [`Session::refresh`]
    /// to populate it.
    pub fn new(backend: B, config: AppConfig) -> Self {
        Self {
            backend,
            config,
            changes: ChangeSet::default(),
            sync_state: SyncState::Idle,
            launcher: Box::new(ProcessLauncher),
        }
    }

    /// Replace the process launcher used for merge and diff tools.
    pub fn with_launcher(mut self, launcher: Box<dyn ToolLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn workdir(&self) -> &Path {
        self.backend.workdir()
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn file_changes(&self) -> &[FileState] {
        self.changes.file_states()
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    // -- change set ---------------------------------------------------------

    /// Rebuild the change set from the backend. On failure the change set is
    /// left empty.
    #[instrument(skip(self))]
    pub fn refresh(&mut self) -> Result<(), ChangesError> {
        match self.backend.statuses() {
            Ok(entries) => {
                self.changes = ChangeSet::from_statuses(
                    &entries,
                    self.backend.workdir(),
                    &self.config.repository.settings_filename,
                );
                debug!(count = self.changes.len(), "change set refreshed");
                Ok(())
            }
            Err(e) => {
                self.changes = ChangeSet::default();
                error!(error = %e, "failed to update file status");
                Err(e.into())
            }
        }
    }

    /// Quick view of `file`, or `None` if it could not be rendered.
    pub fn quick_view(&self, file: &FileState) -> Option<QuickView> {
        quick_view::render(&self.backend, file)
            .inspect_err(|e| error!(path = %file.path, error = %e, "failed to refresh quick view"))
            .ok()
    }

    fn refresh_if(&mut self, refresh: bool) -> Result<(), ChangesError> {
        if refresh {
            self.refresh()?;
        }
        Ok(())
    }

    // -- mutations ----------------------------------------------------------

    pub fn stage_file(&mut self, file: &FileState, refresh: bool) -> Result<(), ChangesError> {
        self.backend
            .stage(&file.path)
            .inspect_err(|e| error!(path = %file.path, error = %e, "failed to stage item"))?;
        self.refresh_if(refresh)
    }

    pub fn unstage_file(&mut self, file: &FileState, refresh: bool) -> Result<(), ChangesError> {
        self.backend
            .unstage(&file.path)
            .inspect_err(|e| error!(path = %file.path, error = %e, "failed to unstage item"))?;
        self.refresh_if(refresh)
    }

    /// Delete an untracked file from disk. Any other state is refused.
    pub fn delete_untracked_file(&mut self, file: &FileState, refresh: bool) -> Result<(), ChangesError> {
        if file.state != StateTag::NewInWorkdir {
            return Err(ChangesError::InvalidState {
                path: file.path.clone(),
                state: file.state,
                operation: "delete",
            });
        }
        remove_if_exists(&self.backend.workdir().join(&file.path))
            .inspect_err(|e| error!(path = %file.path, error = %e, "failed to delete item"))?;
        info!(path = %file.path, "deleted untracked file");
        self.refresh_if(refresh)
    }

    /// Delete every untracked file in the current change set.
    pub fn delete_untracked_files(&mut self, refresh: bool) -> Result<(), ChangesError> {
        let workdir = self.backend.workdir();
        for file in self
            .changes
            .file_states()
            .iter()
            .filter(|f| f.state == StateTag::NewInWorkdir)
        {
            remove_if_exists(&workdir.join(&file.path))
                .inspect_err(|e| error!(path = %file.path, error = %e, "failed to delete item"))?;
            debug!(path = %file.path, "deleted untracked file");
        }
        self.refresh_if(refresh)
    }

    /// Discard every change to tracked files.
    pub fn revert_all(&mut self) -> Result<(), ChangesError> {
        self.backend
            .revert_all()
            .inspect_err(|e| error!(error = %e, "failed to reset"))?;
        info!("reverted all changes");
        self.refresh()
    }

    /// Restore a modified or deleted file from the active branch.
    pub fn revert_file(&mut self, file: &FileState) -> Result<(), ChangesError> {
        if !matches!(
            file.state,
            StateTag::ModifiedInIndex
                | StateTag::ModifiedInWorkdir
                | StateTag::DeletedFromIndex
                | StateTag::DeletedFromWorkdir
        ) {
            return Err(ChangesError::InvalidState {
                path: file.path.clone(),
                state: file.state,
                operation: "revert",
            });
        }

        let branch = self.backend.active_branch()?;
        self.backend
            .revert_file(&branch, &file.path)
            .inspect_err(|e| error!(path = %file.path, error = %e, "failed to reset file"))?;
        info!(path = %file.path, branch = %branch, "reverted file");
        self.refresh()
    }

    /// Commit the index; returns the new commit id.
    pub fn commit_staged_changes(&mut self, message: &str) -> Result<String, ChangesError> {
        let id = self
            .backend
            .commit(message)
            .inspect_err(|e| error!(error = %e, "failed to commit"))?;
        info!(commit = %id, "committed staged changes");
        self.refresh()?;
        Ok(id)
    }

    /// Remove the per-repository settings file when it exists on disk but
    /// was never committed. Returns whether it was removed.
    pub fn delete_repo_settings_if_uncommitted(&self) -> Result<bool, ChangesError> {
        let name = &self.config.repository.settings_filename;
        let path = self.backend.workdir().join(name);
        if !path.exists() || self.backend.is_committed(name)? {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!(path = %name, "removed uncommitted repository settings file");
        Ok(true)
    }

    // -- conflicts ----------------------------------------------------------

    /// Ask the backend whether any path is conflicted. A backend failure is
    /// logged and reported as no conflicts.
    pub fn conflicts_exist(&self) -> bool {
        match self.backend.conflicted_paths() {
            Ok(paths) => !paths.is_empty(),
            Err(e) => {
                error!(error = %e, "failed to get file conflicts");
                false
            }
        }
    }

    /// Whether a merge is waiting to be committed. A backend failure is
    /// logged and reported as no merge.
    pub fn merge_in_progress(&self) -> bool {
        self.backend
            .is_merging()
            .inspect_err(|e| error!(error = %e, "failed to read repository state"))
            .unwrap_or(false)
    }

    /// Run one resolution pass on `file`. When both the resolution and the
    /// refresh fail, the resolution error is returned.
    pub fn resolve_conflict(
        &mut self,
        file: &FileState,
        prompter: &mut dyn ConflictPrompter,
        refresh: bool,
    ) -> Result<ResolveOutcome, ChangesError> {
        let outcome = ConflictResolver::new(&self.backend, self.launcher.as_ref(), &self.config.merge_tool)
            .resolve(file, prompter)
            .inspect_err(|e| error!(path = %file.path, error = %e, "failed to resolve conflict"));
        let refreshed = self.refresh_if(refresh);
        let outcome = outcome?;
        refreshed?;
        Ok(outcome)
    }

    /// Resolve every conflicted file in change-set order, stopping at the
    /// first file that is not resolved. Files resolved before that stay
    /// resolved. Returns whether every conflict was resolved.
    pub fn resolve_all_conflicts(
        &mut self,
        prompter: &mut dyn ConflictPrompter,
        refresh: bool,
    ) -> Result<bool, ChangesError> {
        let conflicted: Vec<FileState> = self.changes.conflicted().cloned().collect();
        let mut all_resolved = true;

        for file in &conflicted {
            match self.resolve_conflict(file, prompter, false) {
                Ok(ResolveOutcome::Resolved) => {}
                Ok(outcome) => {
                    warn!(path = %file.path, ?outcome, "resolve conflict stopped, aborting pending");
                    all_resolved = false;
                    break;
                }
                Err(e) => {
                    // refresh() logs its own failure; the resolution error wins
                    self.refresh_if(refresh).ok();
                    return Err(e);
                }
            }
        }

        self.refresh_if(refresh)?;
        Ok(all_resolved)
    }

    // -- tools --------------------------------------------------------------

    /// Open the configured tool on the committed and working versions of a
    /// modified file and wait for it to exit.
    pub fn open_diff_tool(&self, file: &FileState) -> Result<(), ChangesError> {
        if !matches!(
            file.state,
            StateTag::ModifiedInIndex | StateTag::ModifiedInWorkdir
        ) {
            return Err(ChangesError::InvalidState {
                path: file.path.clone(),
                state: file.state,
                operation: "diff",
            });
        }

        let mut temps = TempFiles::default();
        let original = temps.track(self.backend.save_original_version(&file.path)?);
        let working = self.backend.workdir().join(&file.path);
        let args = diff_args(&original, &working);
        self.launcher
            .run(&self.config.merge_tool.executable(), &args)
            .inspect_err(|e| error!(path = %file.path, error = %e, "failed to start diff tool"))?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MergeAcceptance, MergeFileResolution};
    use crate::testing::{FakeBackend, FakeLauncher, ScriptedPrompter};
    use git2::Status;
    use std::rc::Rc;

    fn session() -> Session<FakeBackend> {
        Session::new(FakeBackend::new(), AppConfig::default())
    }

    fn session_with_launcher(launcher: Rc<FakeLauncher>) -> Session<FakeBackend> {
        session().with_launcher(Box::new(launcher))
    }

    #[test]
    fn test_refresh_classifies_and_skips_settings_file() {
        let mut s = session();
        s.backend().set_status("a.txt", Status::WT_MODIFIED | Status::INDEX_MODIFIED);
        s.backend().set_status(".gitstage-user.toml", Status::WT_NEW);
        s.refresh().unwrap();

        assert_eq!(s.file_changes().len(), 2);
        assert!(s.changes().changes_staged());
        assert!(s.changes().files_are_unstaged());
    }

    #[test]
    fn test_refresh_failure_empties_change_set() {
        let mut s = session();
        s.backend().set_status("a.txt", Status::WT_NEW);
        s.refresh().unwrap();
        assert!(s.changes().changes_exist());

        s.backend().fail_statuses.set(true);
        assert!(s.refresh().is_err());
        assert!(!s.changes().changes_exist());
    }

    #[test]
    fn test_refresh_twice_gives_same_change_set() {
        let mut s = session();
        s.backend().set_status("a.txt", Status::WT_MODIFIED | Status::INDEX_MODIFIED);
        s.backend().set_status("b.txt", Status::WT_NEW);
        s.backend().set_status("c.txt", Status::CONFLICTED);

        s.refresh().unwrap();
        let first = s.changes().clone();
        s.refresh().unwrap();

        assert_eq!(s.changes(), &first);
        assert_eq!(s.file_changes().len(), 4);
    }

    #[test]
    fn test_refresh_survives_unreadable_entry() {
        let mut s = session();
        s.backend().set_status("gone.txt", crate::status::WT_UNREADABLE);
        s.backend().set_status("a.txt", Status::WT_NEW);

        s.refresh().unwrap();

        assert_eq!(
            s.file_changes(),
            &[FileState::new("a.txt", StateTag::NewInWorkdir)]
        );
    }

    #[test]
    fn test_stage_without_refresh_keeps_snapshot() {
        let mut s = session();
        s.backend().set_status("a.txt", Status::WT_MODIFIED);
        s.refresh().unwrap();
        let file = s.file_changes()[0].clone();

        s.stage_file(&file, false).unwrap();
        assert_eq!(s.file_changes()[0].state, StateTag::ModifiedInWorkdir);

        s.refresh().unwrap();
        assert_eq!(s.file_changes()[0].state, StateTag::ModifiedInIndex);
    }

    #[test]
    fn test_stage_failure_is_reported_without_refresh() {
        let mut s = session();
        s.backend().fail_stage.set(true);
        let file = FileState::new("a.txt", StateTag::ModifiedInWorkdir);

        let result = s.stage_file(&file, true);
        assert!(matches!(result, Err(ChangesError::Backend(_))));
        assert_eq!(s.backend().calls(), vec!["stage a.txt"]);
    }

    #[test]
    fn test_delete_untracked_refuses_tracked_file() {
        let mut s = session();
        let path = s.backend().write_file("a.txt", "keep me");
        let file = FileState::new("a.txt", StateTag::ModifiedInWorkdir);

        let result = s.delete_untracked_file(&file, false);
        assert!(matches!(result, Err(ChangesError::InvalidState { .. })));
        assert!(path.exists());
    }

    #[test]
    fn test_delete_untracked_files_only_touches_new_files() {
        let mut s = session();
        let new = s.backend().write_file("new.txt", "x");
        let tracked = s.backend().write_file("tracked.txt", "y");
        s.backend().set_status("new.txt", Status::WT_NEW);
        s.backend().set_status("tracked.txt", Status::WT_MODIFIED);
        s.refresh().unwrap();

        s.delete_untracked_files(false).unwrap();
        assert!(!new.exists());
        assert!(tracked.exists());
    }

    #[test]
    fn test_revert_file_rejects_renamed_and_conflicted() {
        let mut s = session();
        for state in [StateTag::RenamedInIndex, StateTag::TypeChangeInWorkdir, StateTag::Conflicted] {
            let result = s.revert_file(&FileState::new("a.txt", state));
            assert!(matches!(result, Err(ChangesError::InvalidState { .. })));
        }
        assert!(!s.backend().called("revert_file"));
    }

    #[test]
    fn test_revert_file_uses_active_branch() {
        let mut s = session();
        s.backend().set_status("a.txt", Status::WT_DELETED);
        s.revert_file(&FileState::new("a.txt", StateTag::DeletedFromWorkdir))
            .unwrap();

        assert!(s
            .backend()
            .calls()
            .contains(&"revert_file refs/heads/main a.txt".to_string()));
        assert!(s.changes().is_empty());
    }

    #[test]
    fn test_commit_refreshes() {
        let mut s = session();
        s.backend().set_status("a.txt", Status::INDEX_MODIFIED);
        s.refresh().unwrap();

        let id = s.commit_staged_changes("message").unwrap();
        assert_eq!(id.len(), 40);
        assert!(s.changes().is_empty());
    }

    #[test]
    fn test_uncommitted_settings_file_is_removed() {
        let s = session();
        let path = s.backend().write_file(".gitstage-user.toml", "x = 1");
        assert!(s.delete_repo_settings_if_uncommitted().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_committed_settings_file_is_kept() {
        let s = session();
        let path = s.backend().write_file(".gitstage-user.toml", "x = 1");
        s.backend()
            .committed
            .borrow_mut()
            .push(".gitstage-user.toml".into());
        assert!(!s.delete_repo_settings_if_uncommitted().unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_resolve_all_stops_at_first_unresolved() {
        let mut s = session();
        s.backend().add_conflict("a.txt", b"a\n", b"mine a\n", b"theirs a\n");
        s.backend().add_conflict("b.txt", b"b\n", b"b\n", b"theirs b\n");
        s.backend().add_conflict("c.txt", b"c\n", b"mine c\n", b"theirs c\n");
        s.refresh().unwrap();

        // a: keep mine (changes), b: keep mine (unchanged) and decline.
        let mut prompter = ScriptedPrompter::new(
            &[MergeFileResolution::KeepMine, MergeFileResolution::KeepMine],
            &[MergeAcceptance::No],
        );
        let all = s.resolve_all_conflicts(&mut prompter, true).unwrap();

        assert!(!all);
        assert_eq!(prompter.asked_binary.len(), 2);
        let conflicted: Vec<&str> = s.changes().conflicted().map(|f| f.path.as_str()).collect();
        assert_eq!(conflicted, vec!["b.txt", "c.txt"]);
        assert_eq!(
            fs::read(s.workdir().join("a.txt")).unwrap(),
            b"mine a\n".to_vec()
        );
    }

    #[test]
    fn test_resolve_error_is_kept_when_refresh_fails() {
        let mut s = session();
        s.backend().add_conflict("a.txt", b"a\n", b"mine a\n", b"theirs a\n");
        s.refresh().unwrap();
        let file = s.file_changes()[0].clone();
        s.backend().fail_statuses.set(true);

        let mut prompter = ScriptedPrompter::default();
        let result = s.resolve_conflict(&file, &mut prompter, true);
        assert!(matches!(result, Err(ChangesError::PromptUnavailable(_))));
    }

    #[test]
    fn test_resolve_all_error_is_kept_when_refresh_fails() {
        let mut s = session();
        s.backend().add_conflict("a.txt", b"a\n", b"mine a\n", b"theirs a\n");
        s.refresh().unwrap();
        s.backend().fail_statuses.set(true);

        let mut prompter = ScriptedPrompter::default();
        let result = s.resolve_all_conflicts(&mut prompter, true);
        assert!(matches!(result, Err(ChangesError::PromptUnavailable(_))));
    }

    #[test]
    fn test_refresh_failure_after_resolution_is_reported() {
        let mut s = session();
        s.backend().add_conflict("a.txt", b"a\n", b"mine a\n", b"theirs a\n");
        s.refresh().unwrap();
        let file = s.file_changes()[0].clone();
        s.backend().fail_statuses.set(true);

        let mut prompter = ScriptedPrompter::new(&[MergeFileResolution::KeepMine], &[]);
        let result = s.resolve_conflict(&file, &mut prompter, true);
        assert!(matches!(result, Err(ChangesError::Backend(_))));
        assert!(s.backend().called("stage"));
    }

    #[test]
    fn test_merge_in_progress_follows_backend() {
        let mut s = session();
        assert!(!s.merge_in_progress());

        s.backend().merging.set(true);
        assert!(s.merge_in_progress());

        s.commit_staged_changes("merge").unwrap();
        assert!(!s.merge_in_progress());
    }

    #[test]
    fn test_resolve_all_resolves_everything() {
        let mut s = session();
        s.backend().add_conflict("a.txt", b"a\n", b"mine a\n", b"theirs a\n");
        s.backend().add_conflict("b.txt", b"b\n", b"mine b\n", b"theirs b\n");
        s.refresh().unwrap();

        let mut prompter = ScriptedPrompter::new(
            &[MergeFileResolution::UseTheirs, MergeFileResolution::UseTheirs],
            &[],
        );
        assert!(s.resolve_all_conflicts(&mut prompter, true).unwrap());
        assert!(!s.changes().conflicts_exist());
        assert!(!s.conflicts_exist());
    }

    #[test]
    fn test_open_diff_tool_passes_original_then_working() {
        let launcher = Rc::new(FakeLauncher::default());
        let s = session_with_launcher(launcher.clone());
        s.backend().write_file("a.txt", "new\n");
        s.backend()
            .blobs
            .borrow_mut()
            .push(("a.txt".into(), b"old\n".to_vec()));

        s.open_diff_tool(&FileState::new("a.txt", StateTag::ModifiedInWorkdir))
            .unwrap();

        let launches = launcher.launches.borrow();
        let (program, args) = &launches[0];
        assert_eq!(program, Path::new("meld"));
        let original = Path::new(&args[0]);
        assert_eq!(original.parent(), Some(s.workdir()));
        assert!(original
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("a.txt.orig."));
        assert!(!original.exists());
        assert_eq!(Path::new(&args[1]), s.workdir().join("a.txt"));
    }

    #[test]
    fn test_open_diff_tool_leaves_existing_orig_file_alone() {
        let launcher = Rc::new(FakeLauncher::default());
        let s = session_with_launcher(launcher.clone());
        s.backend().write_file("a.txt", "new\n");
        let user_file = s.backend().write_file("a.txt.orig", "mine");
        s.backend()
            .blobs
            .borrow_mut()
            .push(("a.txt".into(), b"old\n".to_vec()));

        s.open_diff_tool(&FileState::new("a.txt", StateTag::ModifiedInWorkdir))
            .unwrap();

        assert_ne!(Path::new(&launcher.launches.borrow()[0].1[0]), user_file);
        assert_eq!(fs::read_to_string(&user_file).unwrap(), "mine");
    }

    #[test]
    fn test_open_diff_tool_rejects_new_file() {
        let s = session();
        let result = s.open_diff_tool(&FileState::new("a.txt", StateTag::NewInWorkdir));
        assert!(matches!(result, Err(ChangesError::InvalidState { .. })));
    }
}
