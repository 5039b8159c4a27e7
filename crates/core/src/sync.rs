//! Pull, push and sync against the upstream of the active branch.
//!
//! While a sync runs, the nested pull and push leave the change set alone;
//! it is refreshed once when the sync finishes.

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::backend::{reborrow, Backend, LineCallback};
use crate::errors::ChangesError;
use crate::models::SyncMergeResult;
use crate::session::Session;

/// Line emitted to the status callback when a sync begins.
pub const SYNC_STARTED: &str = "Syncing Started...";

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Pulling,
    Pushing,
    Syncing,
}

impl<B: Backend> Session<B> {
    /// Pull from the upstream, streaming progress lines to `status`.
    ///
    /// A pull that succeeds at the transport level but leaves conflicted
    /// paths is reported as [`SyncMergeResult::Conflicts`].
    #[instrument(skip_all)]
    pub fn pull(&mut self, status: Option<LineCallback<'_>>) -> SyncMergeResult {
        let nested = self.sync_state == SyncState::Syncing;
        if !nested {
            self.sync_state = SyncState::Pulling;
        }

        let result = self.pull_from_upstream(status);

        if !nested {
            self.sync_state = SyncState::Idle;
            self.refresh().ok();
        }
        result
    }

    fn pull_from_upstream(&mut self, mut status: Option<LineCallback<'_>>) -> SyncMergeResult {
        match self.backend().is_branch_tracking() {
            Ok(true) => {}
            Ok(false) => {
                warn!("branch is not tracking a remote");
                return SyncMergeResult::Error;
            }
            Err(e) => {
                error!(error = %e, "failed to check branch tracking");
                return SyncMergeResult::Error;
            }
        }

        if let Err(e) = self.delete_repo_settings_if_uncommitted() {
            error!(error = %e, "failed to check repository settings file");
            return SyncMergeResult::Error;
        }

        let mut forward = |line: &str| {
            if let Some(callback) = status.as_deref_mut() {
                callback(line);
            }
        };
        let mut result = match self.backend().pull(&mut forward) {
            Ok(()) => SyncMergeResult::Succeeded,
            Err(e) => {
                error!(error = %e, "failed to pull");
                SyncMergeResult::Error
            }
        };

        if self.conflicts_exist() {
            result = SyncMergeResult::Conflicts;
        }

        match result {
            SyncMergeResult::Succeeded => info!("pull succeeded"),
            SyncMergeResult::Conflicts => warn!("merge failed, conflicts exist (please resolve)"),
            SyncMergeResult::Error => error!("pull error"),
        }
        result
    }

    /// Push to the upstream, streaming progress lines to `status`.
    #[instrument(skip_all)]
    pub fn push(&mut self, status: Option<LineCallback<'_>>) -> Result<(), ChangesError> {
        let nested = self.sync_state == SyncState::Syncing;
        if !nested {
            self.sync_state = SyncState::Pushing;
        }

        let result = self.push_to_upstream(status);

        if !nested {
            self.sync_state = SyncState::Idle;
            self.refresh().ok();
        }
        result
    }

    fn push_to_upstream(&mut self, mut status: Option<LineCallback<'_>>) -> Result<(), ChangesError> {
        if !self.backend().is_branch_tracking()? {
            let branch = self
                .backend()
                .active_branch()
                .unwrap_or_else(|_| "HEAD".to_string());
            warn!(branch = %branch, "branch is not tracking a remote");
            return Err(ChangesError::NoUpstream { branch });
        }

        let mut forward = |line: &str| {
            if let Some(callback) = status.as_deref_mut() {
                callback(line);
            }
        };
        self.backend()
            .push(&mut forward)
            .inspect_err(|e| error!(error = %e, "failed to push"))?;
        info!("push succeeded");
        Ok(())
    }

    /// Pull, then push if the pull succeeded. The change set is refreshed
    /// exactly once, after both steps.
    #[instrument(skip_all)]
    pub fn sync(&mut self, mut status: Option<LineCallback<'_>>) -> SyncMergeResult {
        if let Some(callback) = status.as_deref_mut() {
            callback(SYNC_STARTED);
        }
        self.sync_state = SyncState::Syncing;

        let mut result = self.pull(reborrow(&mut status));
        if result == SyncMergeResult::Succeeded && self.push(reborrow(&mut status)).is_err() {
            result = SyncMergeResult::Error;
        }

        self.sync_state = SyncState::Idle;
        if result == SyncMergeResult::Succeeded {
            info!("sync succeeded");
        } else {
            error!(%result, "failed to sync changes");
        }

        self.refresh().ok();
        result
    }
}
