//! Classification of backend status bits into [`FileState`] entries.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use git2::Status;
use tracing::{debug, error, warn};

use crate::models::{FileState, StateTag};

/// libgit2's `GIT_STATUS_WT_UNREADABLE`, which git2 does not name.
pub(crate) const WT_UNREADABLE: Status = Status::from_bits_retain(1 << 12);

/// Status bits that map to a change state, in the order entries are emitted.
pub(crate) const STATE_BITS: [(Status, StateTag); 11] = [
    (Status::WT_MODIFIED, StateTag::ModifiedInWorkdir),
    (Status::INDEX_MODIFIED, StateTag::ModifiedInIndex),
    (Status::WT_NEW, StateTag::NewInWorkdir),
    (Status::INDEX_NEW, StateTag::NewInIndex),
    (Status::WT_DELETED, StateTag::DeletedFromWorkdir),
    (Status::INDEX_DELETED, StateTag::DeletedFromIndex),
    (Status::WT_RENAMED, StateTag::RenamedInWorkdir),
    (Status::INDEX_RENAMED, StateTag::RenamedInIndex),
    (Status::WT_TYPECHANGE, StateTag::TypeChangeInWorkdir),
    (Status::INDEX_TYPECHANGE, StateTag::TypeChangeInIndex),
    (Status::CONFLICTED, StateTag::Conflicted),
];

/// Every bit the classifier understands.
fn known_bits() -> Status {
    STATE_BITS
        .iter()
        .fold(Status::IGNORED | WT_UNREADABLE, |acc, (bit, _)| acc | *bit)
}

/// Append the states described by `status` for `path` to `states`.
///
/// A `(path, tag)` pair already present is not added again. Returns `true` if
/// any index bit was set. Read problems and unknown bits are logged and never
/// abort classification.
pub fn classify_entry(
    workdir: &Path,
    path: &str,
    status: Status,
    states: &mut Vec<FileState>,
) -> bool {
    let mut handled = false;
    let mut staged = false;

    for (bit, tag) in STATE_BITS {
        if !status.contains(bit) {
            continue;
        }
        handled = true;
        staged |= tag.is_staged();
        if !states.iter().any(|s| s.path == path && s.state == tag) {
            debug!(path, state = %tag, "change detected");
            states.push(FileState::new(path, tag));
        }
    }

    if status.contains(Status::IGNORED) {
        handled = true;
    }

    if status.contains(WT_UNREADABLE) {
        handled = true;
        handle_unreadable(&workdir.join(path), path);
    }

    let unknown = status.difference(known_bits());
    if !handled || !unknown.is_empty() {
        error!(path, bits = status.bits(), "unsupported file state");
    }

    staged
}

/// Try to make an unreadable file readable again. The status is not
/// re-queried here; the next refresh picks the file up.
fn handle_unreadable(full_path: &Path, path: &str) {
    if !full_path.exists() {
        error!(path, "expected file doesn't exist");
        return;
    }

    match clear_read_only(full_path) {
        Ok(true) => {
            warn!(path, "cleared read-only attribute, refresh to see its changes");
        }
        Ok(false) => {
            error!(path, "problem reading file, please fix and refresh");
        }
        Err(e) => {
            error!(path, error = %e, "file is not readable, please fix and refresh");
        }
    }
}

/// Clear the read-only attribute of `path`. Returns `true` only if the file
/// was read-only and can be opened afterwards.
fn clear_read_only(path: &Path) -> io::Result<bool> {
    let mut perms = fs::metadata(path)?.permissions();
    if !perms.readonly() {
        return Ok(false);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o600);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }
    fs::set_permissions(path, perms)?;

    File::open(path)?;
    Ok(true)
}
