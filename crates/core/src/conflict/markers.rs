//! Conflict-marker detection and stripping.
//!
//! Only complete blocks count: a `<<<<<<<` line, then a `=======` line, then a
//! `>>>>>>>` line. Marker-like lines outside such a block are left alone.

/// A complete marker block, as line indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerBlock {
    pub start: usize,
    pub separator: usize,
    pub end: usize,
}

fn is_marker(line: &str, marker: &str) -> bool {
    match line.strip_prefix(marker) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

/// Find every complete marker block in `text`.
pub fn find_blocks(text: &str) -> Vec<MarkerBlock> {
    let mut blocks = Vec::new();
    let mut start = None;
    let mut separator = None;

    for (i, line) in text.lines().enumerate() {
        if is_marker(line, "<<<<<<<") {
            start = Some(i);
            separator = None;
        } else if is_marker(line, "=======") && start.is_some() && separator.is_none() {
            separator = Some(i);
        } else if is_marker(line, ">>>>>>>") {
            if let (Some(s), Some(sep)) = (start, separator) {
                blocks.push(MarkerBlock {
                    start: s,
                    separator: sep,
                    end: i,
                });
            }
            start = None;
            separator = None;
        }
    }

    blocks
}

pub fn has_conflict_markers(text: &str) -> bool {
    !find_blocks(text).is_empty()
}

/// Remove the three marker lines of every block, keeping both sides' content
/// concatenated. Returns `None` when there is nothing to strip.
pub fn strip_conflict_markers(text: &str) -> Option<String> {
    let blocks = find_blocks(text);
    if blocks.is_empty() {
        return None;
    }

    let mut skip = blocks
        .iter()
        .flat_map(|b| [b.start, b.separator, b.end])
        .peekable();

    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split_inclusive('\n').enumerate() {
        if skip.peek() == Some(&i) {
            skip.next();
            continue;
        }
        out.push_str(line);
    }
    Some(out)
}
