//! gitstage core library.
//!
//! This crate tracks the working-tree and index changes of a git repository,
//! classifies them into discrete file states, renders quick views of single
//! changes, and drives staging, sync and interactive conflict resolution.

pub mod backend;
pub mod binary;
pub mod changes;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod lfs;
pub mod models;
pub mod quick_view;
pub mod session;
pub mod status;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience.
pub use backend::Backend;
pub use changes::ChangeSet;
pub use config::AppConfig;
pub use git::GitBackend;
pub use session::Session;
pub use sync::SyncState;
