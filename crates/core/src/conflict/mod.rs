//! Interactive resolution of conflicted files.
//!
//! The conflict subsystem is responsible for:
//! 1. **Markers** -- detecting and stripping `<<<<<<<` / `=======` / `>>>>>>>` blocks.
//! 2. **Tools** -- launching the configured external merge / diff program.
//! 3. **Resolution** -- the per-file protocol that asks the user, merges,
//!    detects modification by content hash and stages the result.

pub mod markers;
pub mod resolver;
pub mod tool;

pub use resolver::{ConflictPrompter, ConflictResolver};
pub use tool::{ProcessLauncher, ToolLauncher};
