//! Text vs. binary detection.
//!
//! Content is treated as binary when it is larger than [`MAX_TEXT_SIZE`] or
//! when a NUL byte appears within the first [`MAX_TEXT_SIZE`] bytes.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Largest size still considered renderable text (8 MiB).
pub const MAX_TEXT_SIZE: u64 = 8 * 1024 * 1024;

/// Sniff `reader` one byte at a time, stopping at the byte that decides.
///
/// Nothing past that byte is consumed, so a reader passed as `&mut reader`
/// is left positioned right after it. Pass the reader by value to have it
/// closed when sniffing finishes. Unbuffered sources should be wrapped in a
/// `BufReader` first. Empty input is text.
pub fn is_binary_data<R: Read>(reader: R) -> io::Result<bool> {
    for (position, byte) in (1u64..).zip(reader.take(MAX_TEXT_SIZE + 1).bytes()) {
        if byte? == 0 || position > MAX_TEXT_SIZE {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Sniff an in-memory buffer.
pub fn is_binary_bytes(content: &[u8]) -> bool {
    content.len() as u64 > MAX_TEXT_SIZE
        || content
            .iter()
            .take(MAX_TEXT_SIZE as usize)
            .any(|&b| b == 0)
}

/// Sniff a file on disk. Oversized files are rejected without reading them.
pub fn is_binary_file(path: &Path) -> io::Result<bool> {
    let file = File::open(path)?;
    if file.metadata()?.len() > MAX_TEXT_SIZE {
        return Ok(true);
    }
    is_binary_data(BufReader::new(file))
}
