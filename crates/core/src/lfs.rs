//! Git LFS pointer detection.
//!
//! A blob stored through LFS is checked in as a small text pointer. The quick
//! view reports such blobs by object id instead of printing the pointer text.

/// Magic prefix of every Git LFS pointer file.
const LFS_POINTER_PREFIX: &str = "version https://git-lfs.github.com/spec/v1\n";

/// Pointers are always well below this size.
const MAX_POINTER_SIZE: usize = 1024;

/// Parsed content of a Git LFS pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LfsPointer {
    /// The SHA-256 OID of the blob in LFS storage.
    pub oid: String,
    /// Size in bytes of the actual file content.
    pub size: u64,
}

/// Check whether `content` looks like a Git LFS pointer file.
pub fn is_lfs_pointer(content: &[u8]) -> bool {
    if content.len() >= MAX_POINTER_SIZE {
        return false;
    }
    match std::str::from_utf8(content) {
        Ok(text) => text.starts_with(LFS_POINTER_PREFIX),
        Err(_) => false,
    }
}

/// Parse a Git LFS pointer from bytes.
///
/// Returns `None` if the content is not a complete pointer.
pub fn parse_lfs_pointer(content: &[u8]) -> Option<LfsPointer> {
    if !is_lfs_pointer(content) {
        return None;
    }
    let text = std::str::from_utf8(content).ok()?;

    let mut oid = None;
    let mut size = None;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("oid sha256:") {
            oid = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("size ") {
            size = rest.trim().parse::<u64>().ok();
        }
    }

    Some(LfsPointer {
        oid: oid?,
        size: size?,
    })
}
