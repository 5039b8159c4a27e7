//! Terminal prompts for conflict resolution.

use dialoguer::{Confirm, Select};
use tracing::warn;

use gitstage_core::conflict::ConflictPrompter;
use gitstage_core::models::{FileState, MergeAcceptance, MergeFileResolution};

use crate::style;

const TEXT_CHOICES: &[(&str, MergeFileResolution)] = &[
    ("Run merge tool", MergeFileResolution::RunMergeTool),
    ("Keep mine", MergeFileResolution::KeepMine),
    ("Use theirs", MergeFileResolution::UseTheirs),
    ("Cancel", MergeFileResolution::Cancel),
];

const BINARY_CHOICES: &[(&str, MergeFileResolution)] = &[
    ("Keep mine", MergeFileResolution::KeepMine),
    ("Use theirs", MergeFileResolution::UseTheirs),
    ("Cancel", MergeFileResolution::Cancel),
];

/// Asks the user through `dialoguer`. Escape cancels; a terminal error
/// yields no answer.
pub struct TerminalPrompter;

impl ConflictPrompter for TerminalPrompter {
    fn ask_resolution(&mut self, file: &FileState, is_binary: bool) -> Option<MergeFileResolution> {
        let choices = if is_binary { BINARY_CHOICES } else { TEXT_CHOICES };
        let kind = if is_binary { "Binary file" } else { "File" };
        println!();
        println!("{}", style::warn(&format!("{} '{}' is conflicted", kind, file.path)));

        let labels: Vec<&str> = choices.iter().map(|(label, _)| *label).collect();
        match Select::new()
            .with_prompt("How do you want to resolve it?")
            .items(&labels)
            .default(0)
            .interact_opt()
        {
            Ok(Some(idx)) => choices.get(idx).map(|(_, choice)| *choice),
            Ok(None) => Some(MergeFileResolution::Cancel),
            Err(e) => {
                warn!(error = %e, "failed to read resolution choice");
                None
            }
        }
    }

    fn ask_accept_merged(&mut self, file: &FileState) -> Option<MergeAcceptance> {
        match Confirm::new()
            .with_prompt(format!(
                "No changes were made to '{}'. Accept it as resolved?",
                file.path
            ))
            .default(false)
            .interact_opt()
        {
            Ok(Some(true)) => Some(MergeAcceptance::Yes),
            Ok(Some(false)) | Ok(None) => Some(MergeAcceptance::No),
            Err(e) => {
                warn!(error = %e, "failed to read confirmation");
                None
            }
        }
    }
}
