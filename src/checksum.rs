use std::path::Path;

use crate::error::{Error, Result};

/// Hex-encoded blake3 digest of an in-memory buffer.
///
/// # Examples
///
/// ```
/// use txtindex::checksum::checksum_bytes;
///
/// let a = checksum_bytes(b"hello\n");
/// assert_eq!(a, checksum_bytes(b"hello\n"));
/// assert_ne!(a, checksum_bytes(b"hello"));
/// assert_eq!(a.len(), 64);
/// ```
pub fn checksum_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Hex-encoded blake3 digest of a file's byte content.
///
/// Used only as a change-detection signal between indexing runs.
pub fn file_checksum(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(checksum_bytes(&bytes))
}
