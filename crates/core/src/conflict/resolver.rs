//! Interactive resolution of a single conflicted file.
//!
//! A resolution pass saves both sides of the conflict next to the working
//! file, lets the user pick a side or run a merge tool on a base copy, and
//! installs the base copy over the working file only when it changed or the
//! user explicitly accepts it. Every temporary file is removed before
//! [`ConflictResolver::resolve`] returns, whatever the outcome.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::backend::{create_beside, Backend};
use crate::binary::is_binary_file;
use crate::config::MergeToolConfig;
use crate::errors::ChangesError;
use crate::models::{
    ConflictSide, FileState, MergeAcceptance, MergeFileResolution, ResolveOutcome, StateTag,
};

use super::markers::{has_conflict_markers, strip_conflict_markers};
use super::tool::{merge_args, ToolLauncher};

/// User-decision collaborator for conflict resolution.
///
/// `None` means no answer could be obtained (for example, no terminal is
/// attached); the resolver treats it as a failure.
pub trait ConflictPrompter {
    /// Choose how to resolve `file`. `RunMergeTool` must not be offered when
    /// `is_binary` is set.
    fn ask_resolution(&mut self, file: &FileState, is_binary: bool)
        -> Option<MergeFileResolution>;

    /// Whether the unchanged merge result should be accepted as resolved.
    fn ask_accept_merged(&mut self, file: &FileState) -> Option<MergeAcceptance>;
}

/// Temporary files removed on drop.
#[derive(Debug, Default)]
pub(crate) struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    /// Take ownership of `path` and return it.
    pub(crate) fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed temporary file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove temporary file");
                }
            }
        }
    }
}

/// SHA-256 of a file's content as lowercase hex.
pub(crate) fn file_digest(path: &Path) -> io::Result<String> {
    let content = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

/// Runs the resolution protocol for one conflicted file at a time.
pub struct ConflictResolver<'a, B: Backend + ?Sized> {
    backend: &'a B,
    launcher: &'a dyn ToolLauncher,
    tool: &'a MergeToolConfig,
}

impl<'a, B: Backend + ?Sized> ConflictResolver<'a, B> {
    pub fn new(backend: &'a B, launcher: &'a dyn ToolLauncher, tool: &'a MergeToolConfig) -> Self {
        Self {
            backend,
            launcher,
            tool,
        }
    }

    /// Resolve `file`, asking `prompter` for every decision.
    ///
    /// `Resolved` means the working file was replaced and staged. `Unresolved`
    /// and `Cancelled` leave the file conflicted.
    #[instrument(skip(self, prompter), fields(path = %file.path))]
    pub fn resolve(
        &self,
        file: &FileState,
        prompter: &mut dyn ConflictPrompter,
    ) -> Result<ResolveOutcome, ChangesError> {
        if file.state != StateTag::Conflicted {
            return Err(ChangesError::InvalidState {
                path: file.path.clone(),
                state: file.state,
                operation: "resolve",
            });
        }

        let full_path = self.backend.workdir().join(&file.path);
        let mut temps = TempFiles::default();
        let ours = temps.track(
            self.backend
                .save_conflicted_variant(&file.path, ConflictSide::Ours)?,
        );
        let theirs = temps.track(
            self.backend
                .save_conflicted_variant(&file.path, ConflictSide::Theirs)?,
        );

        if is_binary_file(&ours)? || is_binary_file(&theirs)? {
            return self.resolve_binary(file, &full_path, &ours, &theirs, prompter);
        }
        let base = temps.track(create_beside(&full_path, "base")?);
        self.resolve_text(file, &full_path, &base, &ours, &theirs, prompter)
    }

    fn resolve_binary(
        &self,
        file: &FileState,
        full_path: &Path,
        ours: &Path,
        theirs: &Path,
        prompter: &mut dyn ConflictPrompter,
    ) -> Result<ResolveOutcome, ChangesError> {
        debug!("binary conflict");
        let chosen = match prompter.ask_resolution(file, true) {
            None => return Err(ChangesError::PromptUnavailable(file.path.clone())),
            Some(MergeFileResolution::Error) => {
                warn!("error trying to resolve binary conflict");
                return Err(ChangesError::ResolutionError(file.path.clone()));
            }
            Some(MergeFileResolution::Cancel) => {
                info!("binary conflict resolution cancelled");
                return Ok(ResolveOutcome::Cancelled);
            }
            Some(MergeFileResolution::KeepMine) => ours,
            Some(MergeFileResolution::UseTheirs) => theirs,
            Some(MergeFileResolution::RunMergeTool) => {
                warn!("unsupported response for a binary conflict");
                return Ok(ResolveOutcome::Cancelled);
            }
        };
        self.install(file, chosen, full_path)
    }

    fn resolve_text(
        &self,
        file: &FileState,
        full_path: &Path,
        base: &Path,
        ours: &Path,
        theirs: &Path,
        prompter: &mut dyn ConflictPrompter,
    ) -> Result<ResolveOutcome, ChangesError> {
        fs::copy(full_path, base)?;
        if let Ok(text) = String::from_utf8(fs::read(base)?) {
            if let Some(stripped) = strip_conflict_markers(&text) {
                debug!("stripped conflict markers from base");
                fs::write(base, stripped)?;
            }
        }
        let before = file_digest(base)?;

        match prompter.ask_resolution(file, false) {
            None => return Err(ChangesError::PromptUnavailable(file.path.clone())),
            Some(MergeFileResolution::Error) => {
                warn!("error trying to resolve conflict");
                return Err(ChangesError::ResolutionError(file.path.clone()));
            }
            Some(MergeFileResolution::Cancel) => {
                info!("conflict resolution cancelled");
                return Ok(ResolveOutcome::Cancelled);
            }
            Some(MergeFileResolution::KeepMine) => {
                fs::copy(ours, base)?;
            }
            Some(MergeFileResolution::UseTheirs) => {
                fs::copy(theirs, base)?;
            }
            Some(MergeFileResolution::RunMergeTool) => {
                let args = merge_args(self.tool.kind, ours, base, theirs);
                self.launcher.run(&self.tool.executable(), &args)?;
            }
        }

        if file_digest(base)? != before {
            return self.install(file, base, full_path);
        }

        debug!("merge result unchanged");
        match prompter.ask_accept_merged(file) {
            None => Err(ChangesError::PromptUnavailable(file.path.clone())),
            Some(MergeAcceptance::No) => {
                info!("merge result not accepted, file stays conflicted");
                Ok(ResolveOutcome::Unresolved)
            }
            Some(MergeAcceptance::Yes) => {
                let still_marked = String::from_utf8(fs::read(base)?)
                    .map(|text| has_conflict_markers(&text))
                    .unwrap_or(false);
                if still_marked {
                    warn!("merge result still contains conflict markers, not accepting it");
                    return Ok(ResolveOutcome::Unresolved);
                }
                self.install(file, base, full_path)
            }
        }
    }

    /// Copy `source` over the working file and stage it.
    fn install(
        &self,
        file: &FileState,
        source: &Path,
        full_path: &Path,
    ) -> Result<ResolveOutcome, ChangesError> {
        fs::copy(source, full_path)?;
        self.backend.stage(&file.path)?;
        info!("conflict resolved");
        Ok(ResolveOutcome::Resolved)
    }
}
