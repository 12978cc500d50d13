use crate::chunking::Metadata;

/// Length of the hex identifier stored in the collection.
const ID_HEX_LEN: usize = 32;

/// A stable chunk identifier.
///
/// Derived from `(doc_id, line, index_version)` so that re-ingesting the same
/// line of the same document overwrites the stored chunk instead of adding a
/// duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(String);

impl ChunkId {
    /// Identifier for one line of one document.
    ///
    /// # Examples
    ///
    /// ```
    /// use txtindex::ChunkId;
    ///
    /// let a = ChunkId::new("docs/a.txt", 3, "v1");
    /// assert_eq!(a, ChunkId::new("docs/a.txt", 3, "v1"));
    /// assert_ne!(a, ChunkId::new("docs/a.txt", 4, "v1"));
    /// ```
    pub fn new(doc_id: &str, line: usize, index_version: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"chunk\0");
        hasher.update(doc_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(line.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(index_version.as_bytes());
        Self::from_hasher(&hasher)
    }

    /// Identifier for a text without document coordinates, derived from the
    /// text and its canonical (key-sorted) metadata.
    pub fn from_content(text: &str, metadata: &Metadata) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"content\0");
        hasher.update(text.as_bytes());
        let mut entries: Vec<_> = metadata.iter().collect();
        entries.sort_by_key(|(key, _)| *key);
        for (key, value) in entries {
            hasher.update(b"\0");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
        }
        Self::from_hasher(&hasher)
    }

    /// Pick the best identifier for a chunk given its metadata.
    ///
    /// Metadata carrying `doc_id`, `line` and `index_version` yields the
    /// positional id; anything else falls back to [`ChunkId::from_content`].
    pub fn for_metadata(text: &str, metadata: &Metadata) -> Self {
        let doc_id = metadata.get("doc_id").and_then(|v| v.as_str());
        let line = metadata.get("line").and_then(|v| v.as_u64());
        let version = metadata.get("index_version").and_then(|v| v.as_str());

        match (doc_id, line, version) {
            (Some(doc_id), Some(line), Some(version)) => {
                Self::new(doc_id, line as usize, version)
            }
            _ => Self::from_content(text, metadata),
        }
    }

    fn from_hasher(hasher: &blake3::Hasher) -> Self {
        let hex = hasher.finalize().to_hex();
        Self(hex[..ID_HEX_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChunkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
