use std::path::{Path, PathBuf};

use rayon::prelude::*;
use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    chunk_id::ChunkId,
    chunking::Metadata,
    error::{Error, Result},
};

const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
const VECTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

const DIMENSION_KEY: &str = "dimension";
const DISTANCE_KEY: &str = "distance";
const DISTANCE_COSINE: &str = "cosine";

/// File extension of a collection database inside the db directory.
const COLLECTION_EXT: &str = "redb";

/// Text and metadata of one stored chunk, serialized as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    document: String,
    metadata: Metadata,
}

/// One entry to write into a collection.
#[derive(Debug, Clone)]
pub struct CollectionEntry {
    pub id: ChunkId,
    pub document: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// Nearest neighbours of a query, as parallel arrays in ascending distance
/// order.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub distances: Vec<f32>,
}

/// Metadata equality condition used to exclude or select chunks.
#[derive(Debug, Clone, Copy)]
pub struct MetadataMatch<'a> {
    pub key: &'a str,
    pub value: &'a Value,
}

impl MetadataMatch<'_> {
    fn matches(&self, metadata: &Metadata) -> bool {
        metadata.get(self.key) == Some(self.value)
    }
}

/// A named, persistent vector collection using cosine distance.
///
/// Stored as one redb file per collection:
/// - `chunks`: id -> JSON `{document, metadata}`
/// - `vectors`: id -> f32 values, native byte order
/// - `settings`: collection dimension and distance metric
pub struct Collection {
    db: Database,
    name: String,
    path: PathBuf,
}

impl Collection {
    /// Open the named collection under `db_path`, creating it if needed.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use txtindex::Collection;
    ///
    /// let collection = Collection::open(tmp.path(), "docs").unwrap();
    /// assert_eq!(collection.len().unwrap(), 0);
    /// ```
    pub fn open(db_path: &Path, name: &str) -> Result<Self> {
        validate_name(name)?;
        std::fs::create_dir_all(db_path)
            .map_err(|_| Error::DataDir(db_path.to_path_buf()))?;

        let path = collection_file(db_path, name);
        let db = Database::create(&path)?;

        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.open_table(VECTORS)?;
        {
            let mut settings = txn.open_table(SETTINGS)?;
            settings.insert(DISTANCE_KEY, DISTANCE_COSINE)?;
        }
        txn.commit()?;

        Ok(Self {
            db,
            name: name.to_string(),
            path,
        })
    }

    /// Delete the named collection. Returns `false` if it did not exist.
    pub fn delete_collection(db_path: &Path, name: &str) -> Result<bool> {
        validate_name(name)?;
        match std::fs::remove_file(collection_file(db_path, name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Vector dimension fixed by the first insert, if any.
    pub fn dimension(&self) -> Result<Option<usize>> {
        let txn = self.db.begin_read()?;
        let settings = txn.open_table(SETTINGS)?;
        let Some(guard) = settings.get(DIMENSION_KEY)? else {
            return Ok(None);
        };
        parse_dimension(guard.value()).map(Some)
    }

    /// Insert or overwrite entries in a single transaction.
    pub fn upsert(&self, entries: &[CollectionEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin_write()?;
        {
            let mut settings = txn.open_table(SETTINGS)?;
            let stored = match settings.get(DIMENSION_KEY)? {
                Some(guard) => Some(parse_dimension(guard.value())?),
                None => None,
            };
            let expected = stored.unwrap_or(entries[0].vector.len());
            for entry in entries {
                if entry.vector.len() != expected {
                    return Err(Error::DimensionMismatch {
                        expected,
                        actual: entry.vector.len(),
                    });
                }
            }
            if stored.is_none() {
                settings.insert(DIMENSION_KEY, expected.to_string().as_str())?;
            }
        }
        {
            let mut chunks = txn.open_table(CHUNKS)?;
            let mut vectors = txn.open_table(VECTORS)?;
            for entry in entries {
                let stored = StoredChunk {
                    document: entry.document.clone(),
                    metadata: entry.metadata.clone(),
                };
                let bytes = serde_json::to_vec(&stored)?;
                chunks.insert(entry.id.as_str(), bytes.as_slice())?;
                vectors.insert(
                    entry.id.as_str(),
                    bytemuck::cast_slice::<f32, u8>(&entry.vector),
                )?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Number of stored chunks, soft-deleted ones included.
    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let chunks = txn.open_table(CHUNKS)?;
        Ok(chunks.len()? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of stored chunks not matching `exclude`.
    pub fn count_excluding(&self, exclude: MetadataMatch<'_>) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let chunks = txn.open_table(CHUNKS)?;
        let mut count = 0;
        for entry in chunks.iter()? {
            let (_, v) = entry?;
            let stored: StoredChunk = serde_json::from_slice(v.value())?;
            if !exclude.matches(&stored.metadata) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Fetch the text and metadata of one chunk.
    pub fn get(&self, id: &ChunkId) -> Result<Option<(String, Metadata)>> {
        let txn = self.db.begin_read()?;
        let chunks = txn.open_table(CHUNKS)?;
        let Some(guard) = chunks.get(id.as_str())? else {
            return Ok(None);
        };
        let stored: StoredChunk = serde_json::from_slice(guard.value())?;
        Ok(Some((stored.document, stored.metadata)))
    }

    /// The `k` chunks nearest to `vector` by cosine distance.
    ///
    /// Chunks matching `exclude` are not considered. Ties are ordered by id.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        exclude: Option<MetadataMatch<'_>>,
    ) -> Result<QueryResult> {
        if k == 0 {
            return Ok(QueryResult::default());
        }
        if let Some(expected) = self.dimension()?
            && expected != vector.len()
        {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let candidates = self.load_candidates(exclude)?;

        let mut scored: Vec<(f32, String, StoredChunk)> = candidates
            .into_par_iter()
            .map(|(id, stored, stored_vector)| {
                (cosine_distance(vector, &stored_vector), id, stored)
            })
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(k);

        let mut result = QueryResult::default();
        for (distance, id, stored) in scored {
            result.ids.push(id);
            result.documents.push(stored.document);
            result.metadatas.push(stored.metadata);
            result.distances.push(distance);
        }
        Ok(result)
    }

    fn load_candidates(
        &self,
        exclude: Option<MetadataMatch<'_>>,
    ) -> Result<Vec<(String, StoredChunk, Vec<f32>)>> {
        let txn = self.db.begin_read()?;
        let chunks = txn.open_table(CHUNKS)?;
        let vectors = txn.open_table(VECTORS)?;

        let mut candidates = Vec::new();
        for entry in chunks.iter()? {
            let (k, v) = entry?;
            let stored: StoredChunk = serde_json::from_slice(v.value())?;
            if exclude.is_some_and(|m| m.matches(&stored.metadata)) {
                continue;
            }
            let id = k.value().to_string();
            let Some(vector) = vectors.get(id.as_str())? else {
                continue;
            };
            let values = decode_vector(vector.value());
            candidates.push((id, stored, values));
        }
        Ok(candidates)
    }

    /// Physically remove every chunk whose metadata matches. Returns the
    /// number removed.
    pub fn delete_where(&self, selector: MetadataMatch<'_>) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut chunks = txn.open_table(CHUNKS)?;
            let mut vectors = txn.open_table(VECTORS)?;

            let mut ids = Vec::new();
            for entry in chunks.iter()? {
                let (k, v) = entry?;
                let stored: StoredChunk = serde_json::from_slice(v.value())?;
                if selector.matches(&stored.metadata) {
                    ids.push(k.value().to_string());
                }
            }

            for id in &ids {
                chunks.remove(id.as_str())?;
                vectors.remove(id.as_str())?;
            }
            ids.len()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Set `field = value` in the metadata of every chunk matching
    /// `selector`. Returns the number of chunks whose metadata changed.
    pub fn update_where(
        &self,
        selector: MetadataMatch<'_>,
        field: &str,
        value: Value,
    ) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut chunks = txn.open_table(CHUNKS)?;

            let mut changed = Vec::new();
            for entry in chunks.iter()? {
                let (k, v) = entry?;
                let mut stored: StoredChunk = serde_json::from_slice(v.value())?;
                if selector.matches(&stored.metadata)
                    && stored.metadata.get(field) != Some(&value)
                {
                    stored.metadata.insert(field.to_string(), value.clone());
                    changed.push((k.value().to_string(), stored));
                }
            }

            for (id, stored) in &changed {
                let bytes = serde_json::to_vec(stored)?;
                chunks.insert(id.as_str(), bytes.as_slice())?;
            }
            changed.len()
        };
        txn.commit()?;
        Ok(updated)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn collection_file(db_path: &Path, name: &str) -> PathBuf {
    db_path.join(format!("{name}.{COLLECTION_EXT}"))
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid collection name: {name:?}")))
    }
}

fn parse_dimension(raw: &str) -> Result<usize> {
    raw.parse().map_err(|_| {
        Error::Config(format!("stored collection dimension is invalid: {raw}"))
    })
}

/// Decode stored vector bytes. redb does not guarantee alignment, so values
/// are read one at a time.
fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(std::mem::size_of::<f32>())
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect()
}

/// `1 - cosine similarity`, clamped to `[0, 2]`. A zero vector is at
/// distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 2.0)
}
