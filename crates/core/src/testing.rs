//! In-memory backend for unit tests.
//!
//! The working tree is a real temporary directory so that file operations in
//! the session and the conflict engine behave as they do against git.

use std::cell::{Cell, RefCell};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::Status;
use tempfile::TempDir;

use crate::backend::{create_beside, Backend, BlobContent, LineCallback, StatusEntry};
use crate::conflict::{ConflictPrompter, ToolLauncher};
use crate::errors::{BackendError, ToolError};
use crate::models::{ConflictSide, FileState, MergeAcceptance, MergeFileResolution};

pub(crate) struct FakeConflict {
    pub path: String,
    pub ours: Vec<u8>,
    pub theirs: Vec<u8>,
}

pub(crate) struct FakeBackend {
    dir: TempDir,
    pub statuses: RefCell<Vec<StatusEntry>>,
    pub blobs: RefCell<Vec<(String, Vec<u8>)>>,
    pub committed: RefCell<Vec<String>>,
    pub conflicts: RefCell<Vec<FakeConflict>>,
    pub conflicts_after_pull: RefCell<Vec<FakeConflict>>,
    pub branch: RefCell<Option<String>>,
    pub tracking: Cell<bool>,
    pub remote_lines: RefCell<Vec<String>>,
    pub fail_statuses: Cell<bool>,
    pub fail_pull: Cell<bool>,
    pub fail_push: Cell<bool>,
    pub fail_stage: Cell<bool>,
    pub merging: Cell<bool>,
    /// Every call, in order, as `"<operation> <argument>"`.
    pub calls: RefCell<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            statuses: RefCell::new(Vec::new()),
            blobs: RefCell::new(Vec::new()),
            committed: RefCell::new(Vec::new()),
            conflicts: RefCell::new(Vec::new()),
            conflicts_after_pull: RefCell::new(Vec::new()),
            branch: RefCell::new(Some("refs/heads/main".into())),
            tracking: Cell::new(true),
            remote_lines: RefCell::new(Vec::new()),
            fail_statuses: Cell::new(false),
            fail_pull: Cell::new(false),
            fail_push: Cell::new(false),
            fail_stage: Cell::new(false),
            merging: Cell::new(false),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn write_file(&self, path: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full, content).unwrap();
        full
    }

    pub fn set_status(&self, path: &str, status: Status) {
        let mut statuses = self.statuses.borrow_mut();
        statuses.retain(|e| e.path != path);
        statuses.push(StatusEntry::new(path, status));
    }

    pub fn add_conflict(&self, path: &str, working: &[u8], ours: &[u8], theirs: &[u8]) {
        self.write_file(path, working);
        self.set_status(path, Status::CONFLICTED);
        self.conflicts.borrow_mut().push(FakeConflict {
            path: path.into(),
            ours: ours.to_vec(),
            theirs: theirs.to_vec(),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, operation: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|c| c.split(' ').next() == Some(operation))
    }

    fn record(&self, operation: &str, argument: &str) {
        self.calls
            .borrow_mut()
            .push(format!("{} {}", operation, argument).trim_end().to_string());
    }

    fn fail(command: &str) -> BackendError {
        BackendError::CommandFailed {
            command: command.into(),
            exit_code: 1,
            stderr: "simulated failure".into(),
        }
    }
}

impl Backend for FakeBackend {
    fn workdir(&self) -> &Path {
        self.dir.path()
    }

    fn statuses(&self) -> Result<Vec<StatusEntry>, BackendError> {
        self.record("statuses", "");
        if self.fail_statuses.get() {
            return Err(Self::fail("status"));
        }
        Ok(self.statuses.borrow().clone())
    }

    fn blob(&self, path: &str) -> Result<BlobContent, BackendError> {
        let blobs = self.blobs.borrow();
        let (_, content) = blobs
            .iter()
            .find(|(p, _)| p == path)
            .ok_or_else(|| BackendError::EntryNotFound(path.into()))?;
        Ok(BlobContent {
            is_binary: crate::binary::is_binary_bytes(content),
            content: content.clone(),
        })
    }

    fn diff_workdir(&self, path: &str) -> Result<String, BackendError> {
        Ok(format!("--- a/{path}\n+++ b/{path}\n@@ -1 +1 @@\n-old\n+new\n"))
    }

    fn is_committed(&self, path: &str) -> Result<bool, BackendError> {
        Ok(self.committed.borrow().iter().any(|p| p == path))
    }

    fn stage(&self, path: &str) -> Result<(), BackendError> {
        self.record("stage", path);
        if self.fail_stage.get() {
            return Err(Self::fail("add"));
        }
        self.conflicts.borrow_mut().retain(|c| c.path != path);
        self.set_status(path, Status::INDEX_MODIFIED);
        Ok(())
    }

    fn unstage(&self, path: &str) -> Result<(), BackendError> {
        self.record("unstage", path);
        self.set_status(path, Status::WT_MODIFIED);
        Ok(())
    }

    fn revert_all(&self) -> Result<(), BackendError> {
        self.record("revert_all", "");
        self.statuses
            .borrow_mut()
            .retain(|e| e.status.contains(Status::WT_NEW));
        Ok(())
    }

    fn revert_file(&self, branch: &str, path: &str) -> Result<(), BackendError> {
        self.record("revert_file", &format!("{} {}", branch, path));
        self.statuses.borrow_mut().retain(|e| e.path != path);
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String, BackendError> {
        self.record("commit", message);
        self.statuses
            .borrow_mut()
            .retain(|e| !e.status.intersects(Status::INDEX_MODIFIED | Status::INDEX_NEW));
        self.merging.set(false);
        Ok("0123456789abcdef0123456789abcdef01234567".into())
    }

    fn is_merging(&self) -> Result<bool, BackendError> {
        Ok(self.merging.get())
    }

    fn conflicted_paths(&self) -> Result<Vec<String>, BackendError> {
        self.record("conflicted_paths", "");
        Ok(self.conflicts.borrow().iter().map(|c| c.path.clone()).collect())
    }

    fn save_conflicted_variant(
        &self,
        path: &str,
        side: ConflictSide,
    ) -> Result<PathBuf, BackendError> {
        let conflicts = self.conflicts.borrow();
        let conflict = conflicts
            .iter()
            .find(|c| c.path == path)
            .ok_or_else(|| BackendError::ConflictSideMissing {
                path: path.into(),
                side: side.to_string(),
            })?;
        let content = match side {
            ConflictSide::Ours => &conflict.ours,
            ConflictSide::Theirs => &conflict.theirs,
        };
        let target = create_beside(&self.dir.path().join(path), &side.to_string())?;
        std::fs::write(&target, content)?;
        Ok(target)
    }

    fn save_original_version(&self, path: &str) -> Result<PathBuf, BackendError> {
        let blob = self.blob(path)?;
        let target = create_beside(&self.dir.path().join(path), "orig")?;
        std::fs::write(&target, blob.content)?;
        Ok(target)
    }

    fn active_branch(&self) -> Result<String, BackendError> {
        self.branch
            .borrow()
            .clone()
            .ok_or_else(|| BackendError::NoActiveBranch("HEAD is detached".into()))
    }

    fn is_branch_tracking(&self) -> Result<bool, BackendError> {
        Ok(self.tracking.get())
    }

    fn pull(&self, on_line: LineCallback<'_>) -> Result<(), BackendError> {
        self.record("pull", "");
        for line in self.remote_lines.borrow().iter() {
            on_line(line);
        }
        if self.fail_pull.get() {
            return Err(Self::fail("pull"));
        }
        let incoming: Vec<FakeConflict> = self.conflicts_after_pull.borrow_mut().drain(..).collect();
        for conflict in incoming {
            self.set_status(&conflict.path, Status::CONFLICTED);
            self.conflicts.borrow_mut().push(conflict);
        }
        Ok(())
    }

    fn push(&self, on_line: LineCallback<'_>) -> Result<(), BackendError> {
        self.record("push", "");
        for line in self.remote_lines.borrow().iter() {
            on_line(line);
        }
        if self.fail_push.get() {
            return Err(Self::fail("push"));
        }
        Ok(())
    }
}

/// Answers prompts from fixed queues; an exhausted queue means "no answer".
#[derive(Default)]
pub(crate) struct ScriptedPrompter {
    pub resolutions: Vec<MergeFileResolution>,
    pub acceptances: Vec<MergeAcceptance>,
    /// `is_binary` flag of every resolution prompt, in order.
    pub asked_binary: Vec<bool>,
    pub acceptance_asked: usize,
}

impl ScriptedPrompter {
    pub fn new(resolutions: &[MergeFileResolution], acceptances: &[MergeAcceptance]) -> Self {
        Self {
            resolutions: resolutions.iter().rev().copied().collect(),
            acceptances: acceptances.iter().rev().copied().collect(),
            ..Self::default()
        }
    }
}

impl ConflictPrompter for ScriptedPrompter {
    fn ask_resolution(&mut self, _file: &FileState, is_binary: bool) -> Option<MergeFileResolution> {
        self.asked_binary.push(is_binary);
        self.resolutions.pop()
    }

    fn ask_accept_merged(&mut self, _file: &FileState) -> Option<MergeAcceptance> {
        self.acceptance_asked += 1;
        self.acceptances.pop()
    }
}

/// Records launches instead of spawning processes. When `write_arg` is set,
/// the launch writes `output` into that argument's path, standing in for a
/// user saving the merge result.
#[derive(Default)]
pub(crate) struct FakeLauncher {
    pub launches: RefCell<Vec<(PathBuf, Vec<OsString>)>>,
    pub write_arg: Option<usize>,
    pub output: Vec<u8>,
    pub fail: bool,
}

impl ToolLauncher for FakeLauncher {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), ToolError> {
        self.launches
            .borrow_mut()
            .push((program.to_path_buf(), args.to_vec()));
        if self.fail {
            return Err(ToolError::ExitStatus {
                program: program.display().to_string(),
                code: 2,
            });
        }
        if let Some(idx) = self.write_arg {
            std::fs::write(&args[idx], &self.output).unwrap();
        }
        Ok(())
    }
}

impl ToolLauncher for std::rc::Rc<FakeLauncher> {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), ToolError> {
        self.as_ref().run(program, args)
    }
}

/// Log sink shared between a test and its subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with every tracing event, down to `TRACE`, written to a buffer.
/// Returns the result of `f` and the captured log text.
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .without_time()
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}
