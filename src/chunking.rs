//! Line-level chunking.
//!
//! Every non-empty line of a document, with surrounding whitespace trimmed,
//! becomes one chunk. Line numbers are 1-based positions in the original
//! file, blank lines included.

use serde::{Deserialize, Serialize};

/// Free-form chunk metadata as stored in the collection.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Per-chunk metadata written for every ingested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub checksum: String,
    pub deleted: bool,
    pub source: String,
    pub line: usize,
    pub index_version: String,
}

impl ChunkMetadata {
    pub fn to_metadata(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert("doc_id".into(), self.doc_id.clone().into());
        map.insert("checksum".into(), self.checksum.clone().into());
        map.insert("deleted".into(), self.deleted.into());
        map.insert("source".into(), self.source.clone().into());
        map.insert("line".into(), self.line.into());
        map.insert("index_version".into(), self.index_version.clone().into());
        map
    }
}

/// One indexed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Split text into `(line_number, trimmed_line)` pairs, skipping blank lines.
///
/// # Examples
///
/// ```
/// use txtindex::chunking::split_lines;
///
/// let lines = split_lines("hello\n\n  world  \n");
/// assert_eq!(lines, vec![(1, "hello"), (3, "world")]);
/// ```
pub fn split_lines(text: &str) -> Vec<(usize, &str)> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let trimmed = line.trim();
            (!trimmed.is_empty()).then_some((i + 1, trimmed))
        })
        .collect()
}

/// Chunk a whole document, attaching metadata to every line.
pub fn chunk_document(
    doc_id: &str,
    checksum: &str,
    index_version: &str,
    text: &str,
) -> Vec<Chunk> {
    split_lines(text)
        .into_iter()
        .map(|(line, content)| Chunk {
            text: content.to_string(),
            metadata: ChunkMetadata {
                doc_id: doc_id.to_string(),
                checksum: checksum.to_string(),
                deleted: false,
                source: doc_id.to_string(),
                line,
                index_version: index_version.to_string(),
            },
        })
        .collect()
}
