use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What the previous run knew about one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub checksum: String,
    pub deleted: bool,
}

impl DocumentRecord {
    pub fn live(checksum: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
            deleted: false,
        }
    }

    /// The same record with the deleted flag set. The checksum is kept.
    pub fn into_deleted(self) -> Self {
        Self {
            deleted: true,
            ..self
        }
    }
}

/// All document records, keyed by file path.
///
/// Serialized as a flat JSON object:
/// `{ "<path>": { "checksum": "<hex>", "deleted": false } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexState {
    documents: BTreeMap<String, DocumentRecord>,
}

impl IndexState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&DocumentRecord> {
        self.documents.get(path)
    }

    pub fn insert(&mut self, path: String, record: DocumentRecord) {
        self.documents.insert(path, record);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.documents.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocumentRecord)> {
        self.documents.iter()
    }

    /// Number of records not marked deleted.
    pub fn live_count(&self) -> usize {
        self.documents.values().filter(|r| !r.deleted).count()
    }

    pub fn deleted_count(&self) -> usize {
        self.documents.values().filter(|r| r.deleted).count()
    }

    /// Every record marked deleted, checksums kept. Reconciling against
    /// this re-ingests every file still present.
    pub fn into_all_deleted(self) -> Self {
        let documents = self
            .documents
            .into_iter()
            .map(|(path, record)| (path, record.into_deleted()))
            .collect();
        Self { documents }
    }
}

/// Reads and writes [`IndexState`] as a single JSON file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state.
    ///
    /// A missing file is an empty state. Unparseable content is an error,
    /// never an empty or partial state.
    pub fn load(&self) -> Result<IndexState> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(IndexState::new());
            }
            Err(source) => {
                return Err(Error::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| Error::CorruptState {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the persisted state with `state`.
    ///
    /// Writes to a temporary file next to the target and renames it into
    /// place, so readers see either the old or the new content.
    pub fn save(&self, state: &IndexState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|_| Error::DataDir(dir.clone()))?;

        let mut bytes = serde_json::to_vec_pretty(state)?;
        bytes.push(b'\n');

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> IndexState {
        let mut state = IndexState::new();
        state.insert("docs/a.txt".into(), DocumentRecord::live("aaa"));
        state.insert(
            "docs/b.txt".into(),
            DocumentRecord::live("bbb").into_deleted(),
        );
        state
    }

    #[test]
    fn all_deleted_keeps_every_record_and_checksum() {
        let state = sample_state().into_all_deleted();
        assert_eq!(state.len(), 2);
        assert_eq!(state.live_count(), 0);
        assert_eq!(state.get("docs/a.txt").unwrap().checksum, "aaa");
        assert_eq!(state.get("docs/b.txt").unwrap().checksum, "bbb");
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        let state = sample_state();

        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn save_of_load_is_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        store.save(&sample_state()).unwrap();
        let first = std::fs::read(store.path()).unwrap();

        store.save(&store.load().unwrap()).unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn persisted_format_is_flat_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        store.save(&sample_state()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap())
                .unwrap();
        assert_eq!(raw["docs/a.txt"]["checksum"], "aaa");
        assert_eq!(raw["docs/a.txt"]["deleted"], false);
        assert_eq!(raw["docs/b.txt"]["deleted"], true);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{\"docs/a.txt\": {\"checksum\": ").unwrap();

        let err = StateStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::CorruptState { .. }));
    }

    #[test]
    fn wrong_shape_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = StateStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::CorruptState { .. }));
    }

    #[test]
    fn save_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("nested/dir/state.json"));
        store.save(&sample_state()).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn save_replaces_previous_content() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        store.save(&sample_state()).unwrap();

        let mut smaller = IndexState::new();
        smaller.insert("docs/c.txt".into(), DocumentRecord::live("ccc"));
        store.save(&smaller).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains("docs/c.txt"));
    }

    #[test]
    fn counts_live_and_deleted() {
        let state = sample_state();
        assert_eq!(state.live_count(), 1);
        assert_eq!(state.deleted_count(), 1);
    }

    #[test]
    fn deleting_keeps_checksum() {
        let record = DocumentRecord::live("abc").into_deleted();
        assert!(record.deleted);
        assert_eq!(record.checksum, "abc");
    }
}
