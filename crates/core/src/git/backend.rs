//! [`Backend`] implementation over a local repository via `git2`.
//!
//! Pull and push go through the `git` executable so that the user's
//! credential helpers, hooks and LFS filters apply.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use git2::build::CheckoutBuilder;
use git2::{
    Branch, Delta, DiffFormat, DiffOptions, ErrorCode, Index, ObjectType, Oid, Repository,
    RepositoryState, ResetType, StatusOptions,
};
use tracing::{debug, info, instrument, warn};

use crate::backend::{create_beside, Backend, BlobContent, LineCallback, StatusEntry};
use crate::errors::BackendError;
use crate::models::ConflictSide;
use crate::status::WT_UNREADABLE;

pub struct GitBackend {
    repo: Repository,
    workdir: PathBuf,
}

fn is_unborn(e: &git2::Error) -> bool {
    matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

impl GitBackend {
    /// Open the repository containing `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::discover(path)
            .map_err(|_| BackendError::RepositoryNotFound(path.display().to_string()))?;
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| BackendError::NoWorkdir(repo.path().display().to_string()))?;
        Ok(Self { repo, workdir })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// The index, re-read from disk so external changes are visible.
    fn index(&self) -> Result<Index, BackendError> {
        let mut index = self.repo.index()?;
        index.read(false)?;
        Ok(index)
    }

    fn head_tree_blob(&self, path: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if is_unborn(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let tree = head.peel_to_tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = self.repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    fn write_beside(&self, path: &str, label: &str, content: &[u8]) -> Result<PathBuf, BackendError> {
        let target = create_beside(&self.workdir.join(path), label)?;
        fs::write(&target, content)?;
        debug!(path = %target.display(), "saved file version");
        Ok(target)
    }

    /// Parents recorded by an in-progress merge.
    fn merge_heads(&self) -> Result<Vec<Oid>, BackendError> {
        let merge_head = self.repo.path().join("MERGE_HEAD");
        if !merge_head.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for line in fs::read_to_string(merge_head)?.lines() {
            let line = line.trim();
            if !line.is_empty() {
                ids.push(Oid::from_str(line)?);
            }
        }
        Ok(ids)
    }

    fn run_git_streaming(&self, args: &[&str], on_line: LineCallback<'_>) -> Result<(), BackendError> {
        debug!(cmd = ?format!("git {}", args.join(" ")), "running git command");
        let mut child = Command::new("git")
            .current_dir(&self.workdir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, false, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, true, tx.clone()));
        }
        drop(tx);

        let mut stderr_lines = Vec::new();
        for (is_stderr, line) in rx {
            on_line(&line);
            if is_stderr {
                stderr_lines.push(line);
            }
        }
        for reader in readers {
            if reader.join().is_err() {
                warn!("git output reader panicked");
            }
        }

        let status = child.wait()?;
        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            let stderr = stderr_lines.join("\n");
            warn!(exit_code, %stderr, "git command failed");
            return Err(BackendError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                exit_code,
                stderr,
            });
        }
        Ok(())
    }
}

/// Forward every line of `reader` to `tx`, tagged with its stream.
fn spawn_line_reader<R: Read + Send + 'static>(
    reader: R,
    is_stderr: bool,
    tx: Sender<(bool, String)>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            if tx.send((is_stderr, line)).is_err() {
                break;
            }
        }
    })
}

impl Backend for GitBackend {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    #[instrument(skip(self))]
    fn statuses(&self) -> Result<Vec<StatusEntry>, BackendError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_unreadable(true)
            .include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let entries: Vec<StatusEntry> = statuses
            .iter()
            .map(|e| {
                // git2 drops the unreadable bit; the workdir delta still carries it
                let mut status = e.status();
                if matches!(
                    e.index_to_workdir().map(|d| d.status()),
                    Some(Delta::Unreadable)
                ) {
                    status |= WT_UNREADABLE;
                }
                StatusEntry::new(String::from_utf8_lossy(e.path_bytes()), status)
            })
            .collect();
        debug!(count = entries.len(), "queried status");
        Ok(entries)
    }

    fn blob(&self, path: &str) -> Result<BlobContent, BackendError> {
        let index = self.index()?;
        if let Some(entry) = index.get_path(Path::new(path), 0) {
            let blob = self.repo.find_blob(entry.id)?;
            return Ok(BlobContent {
                is_binary: blob.is_binary(),
                content: blob.content().to_vec(),
            });
        }

        let content = self
            .head_tree_blob(path)?
            .ok_or_else(|| BackendError::EntryNotFound(path.to_string()))?;
        Ok(BlobContent {
            is_binary: crate::binary::is_binary_bytes(&content),
            content,
        })
    }

    fn diff_workdir(&self, path: &str) -> Result<String, BackendError> {
        let index = self.index()?;
        let mut opts = DiffOptions::new();
        opts.pathspec(path).disable_pathspec_match(true);
        let diff = self
            .repo
            .diff_index_to_workdir(Some(&index), Some(&mut opts))?;

        let mut out = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if let origin @ ('+' | '-' | ' ') = line.origin() {
                out.push(origin);
            }
            out.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;
        Ok(out)
    }

    fn is_committed(&self, path: &str) -> Result<bool, BackendError> {
        Ok(self.head_tree_blob(path)?.is_some())
    }

    #[instrument(skip(self))]
    fn stage(&self, path: &str) -> Result<(), BackendError> {
        let mut index = self.index()?;
        if self.workdir.join(path).exists() {
            index.add_path(Path::new(path))?;
        } else {
            index.remove_path(Path::new(path))?;
        }
        index.write()?;
        debug!("staged");
        Ok(())
    }

    #[instrument(skip(self))]
    fn unstage(&self, path: &str) -> Result<(), BackendError> {
        match self.repo.head() {
            Ok(head) => {
                let target = head.peel(ObjectType::Commit)?;
                self.repo.reset_default(Some(&target), [path])?;
            }
            Err(e) if is_unborn(&e) => {
                let mut index = self.index()?;
                index.remove_path(Path::new(path))?;
                index.write()?;
            }
            Err(e) => return Err(e.into()),
        }
        debug!("unstaged");
        Ok(())
    }

    #[instrument(skip(self))]
    fn revert_all(&self) -> Result<(), BackendError> {
        let head = self.repo.head()?.peel(ObjectType::Commit)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.repo
            .reset(&head, ResetType::Hard, Some(&mut checkout))?;
        info!("reset to HEAD");
        Ok(())
    }

    #[instrument(skip(self))]
    fn revert_file(&self, branch: &str, path: &str) -> Result<(), BackendError> {
        let commit = self.repo.revparse_single(branch)?.peel_to_commit()?;
        self.repo.reset_default(Some(commit.as_object()), [path])?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().path(path);
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))?;
        debug!("restored from branch");
        Ok(())
    }

    #[instrument(skip(self, message))]
    fn commit(&self, message: &str) -> Result<String, BackendError> {
        let mut index = self.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.repo.signature()?;

        let mut parents = Vec::new();
        match self.repo.head() {
            Ok(head) => parents.push(head.peel_to_commit()?),
            Err(e) if is_unborn(&e) => {}
            Err(e) => return Err(e.into()),
        }
        let merge_heads = self.merge_heads()?;
        for id in &merge_heads {
            parents.push(self.repo.find_commit(*id)?);
        }
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )?;
        if !merge_heads.is_empty() {
            self.repo.cleanup_state()?;
        }
        info!(sha = %oid, "created commit");
        Ok(oid.to_string())
    }

    fn is_merging(&self) -> Result<bool, BackendError> {
        Ok(self.repo.state() == RepositoryState::Merge)
    }

    fn conflicted_paths(&self) -> Result<Vec<String>, BackendError> {
        let index = self.index()?;
        if !index.has_conflicts() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                paths.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        Ok(paths)
    }

    #[instrument(skip(self))]
    fn save_conflicted_variant(
        &self,
        path: &str,
        side: ConflictSide,
    ) -> Result<PathBuf, BackendError> {
        let index = self.index()?;
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let matches_path = [&conflict.ancestor, &conflict.our, &conflict.their]
                .into_iter()
                .flatten()
                .any(|e| e.path == path.as_bytes());
            if !matches_path {
                continue;
            }

            let entry = match side {
                ConflictSide::Ours => conflict.our,
                ConflictSide::Theirs => conflict.their,
            };
            let Some(entry) = entry else { break };
            let blob = self.repo.find_blob(entry.id)?;
            return self.write_beside(path, &side.to_string(), blob.content());
        }

        Err(BackendError::ConflictSideMissing {
            path: path.to_string(),
            side: side.to_string(),
        })
    }

    fn save_original_version(&self, path: &str) -> Result<PathBuf, BackendError> {
        let content = self
            .head_tree_blob(path)?
            .ok_or_else(|| BackendError::EntryNotFound(path.to_string()))?;
        self.write_beside(path, "orig", &content)
    }

    fn active_branch(&self) -> Result<String, BackendError> {
        let head = self
            .repo
            .head()
            .map_err(|e| BackendError::NoActiveBranch(e.message().to_string()))?;
        if !head.is_branch() {
            return Err(BackendError::NoActiveBranch("HEAD is detached".into()));
        }
        head.name()
            .map(str::to_string)
            .ok_or_else(|| BackendError::NoActiveBranch("branch name is not UTF-8".into()))
    }

    fn is_branch_tracking(&self) -> Result<bool, BackendError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if is_unborn(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !head.is_branch() {
            return Ok(false);
        }
        match Branch::wrap(head).upstream() {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip_all)]
    fn pull(&self, on_line: LineCallback<'_>) -> Result<(), BackendError> {
        self.run_git_streaming(&["pull", "--no-edit"], on_line)?;
        info!("pull completed");
        Ok(())
    }

    #[instrument(skip_all)]
    fn push(&self, on_line: LineCallback<'_>) -> Result<(), BackendError> {
        self.run_git_streaming(&["push"], on_line)?;
        info!("push completed");
        Ok(())
    }
}
