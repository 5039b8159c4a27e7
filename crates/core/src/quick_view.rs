//! Human-viewable rendering of a single change.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::backend::Backend;
use crate::binary::is_binary_file;
use crate::errors::ChangesError;
use crate::lfs::parse_lfs_pointer;
use crate::models::{FileState, QuickView, StateTag};

/// Replaces every hunk header after the first.
pub const SECTION_SEPARATOR: &str = "<<< ----------- SECTION ----------- >>>";

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

static HUNK_HEADER_REGEX: OnceLock<Regex> = OnceLock::new();

fn hunk_header_regex() -> &'static Regex {
    HUNK_HEADER_REGEX.get_or_init(|| {
        Regex::new(r"^@@ -\d+(,\d+)? \+\d+(,\d+)? @@").expect("Failed to compile hunk header regex")
    })
}

/// Render `file` for display.
pub fn render<B: Backend + ?Sized>(backend: &B, file: &FileState) -> Result<QuickView, ChangesError> {
    let full_path = backend.workdir().join(&file.path);
    if !full_path.exists() {
        return Ok(QuickView::Missing);
    }

    match file.state {
        StateTag::NewInWorkdir | StateTag::NewInIndex | StateTag::Conflicted => {
            if is_binary_file(&full_path)? {
                return Ok(QuickView::Binary);
            }
            let content = std::fs::read(&full_path)?;
            return Ok(text_view(&content));
        }
        _ => {}
    }

    let blob = backend.blob(&file.path)?;
    if blob.is_binary || is_binary_file(&full_path)? {
        return Ok(QuickView::Binary);
    }

    if file.state == StateTag::ModifiedInWorkdir {
        let diff = backend.diff_workdir(&file.path)?;
        return Ok(QuickView::Text(strip_diff_metadata(&diff)));
    }

    Ok(text_view(&blob.content))
}

fn text_view(content: &[u8]) -> QuickView {
    match parse_lfs_pointer(content) {
        Some(ptr) => QuickView::LfsPointer {
            oid: ptr.oid,
            size: ptr.size,
        },
        None => QuickView::Text(String::from_utf8_lossy(content).into_owned()),
    }
}

/// Reduce a unified diff to its hunk bodies.
///
/// Everything up to and including the first hunk header is dropped, "no
/// newline" notes are removed, and every later hunk header becomes a line
/// holding [`SECTION_SEPARATOR`]. A diff without hunks renders as empty.
pub fn strip_diff_metadata(diff: &str) -> String {
    let mut lines = diff.split_inclusive('\n');
    if !lines.by_ref().any(|line| hunk_header_regex().is_match(line)) {
        return String::new();
    }

    let mut out = String::with_capacity(diff.len());
    for line in lines {
        if line.trim_end_matches(['\r', '\n']) == NO_NEWLINE_MARKER {
            continue;
        }
        if hunk_header_regex().is_match(line) {
            out.push('\n');
            out.push_str(SECTION_SEPARATOR);
            out.push('\n');
        } else {
            out.push_str(line);
        }
    }
    out
}
