//! Git repository access.

pub mod backend;

pub use backend::GitBackend;
