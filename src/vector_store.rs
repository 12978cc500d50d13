use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    chunk_id::ChunkId,
    chunking::Metadata,
    collection::{Collection, CollectionEntry, MetadataMatch, QueryResult},
    embedding::{Embedder, check_batch},
    error::{Error, Result},
};

/// Texts are embedded and written in batches of this size.
pub const EMBED_BATCH_SIZE: usize = 64;

/// One query hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub text: String,
    pub metadata: Metadata,
    /// Cosine distance; smaller is more similar.
    pub distance: f32,
}

/// A collection paired with the embedder used for both ingestion and
/// queries.
pub struct VectorStore<E> {
    collection: Collection,
    embedder: E,
}

impl<E: Embedder> VectorStore<E> {
    pub fn new(collection: Collection, embedder: E) -> Self {
        Self {
            collection,
            embedder,
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Embed and store `texts`.
    ///
    /// Missing metadata becomes an empty map. Missing ids are derived with
    /// [`ChunkId::for_metadata`], so adding the same chunk twice overwrites
    /// it and identical texts without metadata collapse into one chunk.
    /// Returns the number of distinct chunks written.
    pub fn add(
        &mut self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        ids: Option<&[ChunkId]>,
    ) -> Result<usize> {
        if texts.is_empty() {
            return Ok(0);
        }
        if let Some(m) = metadatas
            && m.len() != texts.len()
        {
            return Err(Error::Config(format!(
                "{} metadatas supplied for {} texts",
                m.len(),
                texts.len()
            )));
        }
        if let Some(i) = ids
            && i.len() != texts.len()
        {
            return Err(Error::Config(format!(
                "{} ids supplied for {} texts",
                i.len(),
                texts.len()
            )));
        }

        let mut written = HashSet::new();
        for start in (0..texts.len()).step_by(EMBED_BATCH_SIZE) {
            let end = (start + EMBED_BATCH_SIZE).min(texts.len());
            let batch = &texts[start..end];
            let vectors = self.embedder.embed(batch)?;
            check_batch(batch, &vectors)?;

            let entries: Vec<CollectionEntry> = batch
                .iter()
                .zip(vectors)
                .enumerate()
                .map(|(offset, (text, vector))| {
                    let i = start + offset;
                    let metadata = metadatas
                        .map(|m| m[i].clone())
                        .unwrap_or_default();
                    let id = match ids {
                        Some(ids) => ids[i].clone(),
                        None => ChunkId::for_metadata(text, &metadata),
                    };
                    CollectionEntry {
                        id,
                        document: text.clone(),
                        metadata,
                        vector,
                    }
                })
                .collect();

            self.collection.upsert(&entries)?;
            written.extend(entries.iter().map(|e| e.id.clone()));
            debug!(
                collection = self.collection.name(),
                batch = entries.len(),
                "stored batch"
            );
        }

        Ok(written.len())
    }

    /// Number of stored chunks, soft-deleted ones included.
    pub fn count(&self) -> Result<usize> {
        self.collection.len()
    }

    /// Number of chunks visible to [`VectorStore::similarity_search`].
    pub fn count_live(&self) -> Result<usize> {
        let deleted = json!(true);
        self.collection.count_excluding(deleted_match(&deleted))
    }

    /// The `k` stored chunks nearest to `query`, nearest first.
    ///
    /// Soft-deleted chunks are never returned. An empty collection or
    /// `k == 0` gives an empty list, not an error.
    pub fn similarity_search(
        &mut self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if k == 0 || self.collection.is_empty()? {
            return Ok(Vec::new());
        }

        let texts = [query.to_string()];
        let mut vectors = self.embedder.embed(&texts)?;
        check_batch(&texts, &vectors)?;
        let vector = vectors.pop().unwrap_or_default();

        let deleted = json!(true);
        let result =
            self.collection
                .query(&vector, k, Some(deleted_match(&deleted)))?;
        Ok(shape_results(result))
    }

    /// Physically remove every chunk of `doc_id`. Returns the number removed.
    pub fn remove_document(&self, doc_id: &str) -> Result<usize> {
        let doc_id = Value::from(doc_id);
        self.collection.delete_where(doc_match(&doc_id))
    }

    /// Flag every chunk of `doc_id` as deleted so it drops out of search
    /// results. Returns the number of chunks newly flagged.
    pub fn mark_document_deleted(&self, doc_id: &str) -> Result<usize> {
        let doc_id = Value::from(doc_id);
        self.collection
            .update_where(doc_match(&doc_id), "deleted", json!(true))
    }
}

impl<E> std::fmt::Debug for VectorStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn deleted_match(value: &Value) -> MetadataMatch<'_> {
    MetadataMatch {
        key: "deleted",
        value,
    }
}

fn doc_match(value: &Value) -> MetadataMatch<'_> {
    MetadataMatch {
        key: "doc_id",
        value,
    }
}

/// Zip the parallel arrays of a query result into records.
fn shape_results(result: QueryResult) -> Vec<RetrievalResult> {
    result
        .documents
        .into_iter()
        .zip(result.metadatas)
        .zip(result.distances)
        .map(|((text, metadata), distance)| RetrievalResult {
            text,
            metadata,
            distance,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunking::chunk_document, embedding::HashingEmbedder};

    fn test_store() -> (tempfile::TempDir, VectorStore<HashingEmbedder>) {
        let tmp = tempfile::tempdir().unwrap();
        let collection = Collection::open(tmp.path(), "docs").unwrap();
        (tmp, VectorStore::new(collection, HashingEmbedder::default()))
    }

    fn strings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    fn add_document(
        store: &mut VectorStore<HashingEmbedder>,
        doc_id: &str,
        text: &str,
    ) {
        let chunks = chunk_document(doc_id, "sum", "v1", text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let metas: Vec<Metadata> =
            chunks.iter().map(|c| c.metadata.to_metadata()).collect();
        store.add(&texts, Some(&metas), None).unwrap();
    }

    /// Embedder returning the wrong number of vectors.
    struct Broken;

    impl Embedder for Broken {
        fn dimension(&self) -> Option<usize> {
            None
        }

        fn embed(&mut self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn add_empty_is_noop() {
        let (_tmp, mut store) = test_store();
        assert_eq!(store.add(&[], None, None).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn add_without_metadata_or_ids() {
        let (_tmp, mut store) = test_store();
        store.add(&strings(&["hello", "world"]), None, None).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        let results = store.similarity_search("hello", 1).unwrap();
        assert_eq!(results[0].text, "hello");
        assert!(results[0].metadata.is_empty());
    }

    #[test]
    fn readding_same_chunks_does_not_duplicate() {
        let (_tmp, mut store) = test_store();
        add_document(&mut store, "a.txt", "hello\nworld\n");
        add_document(&mut store, "a.txt", "hello\nworld\n");
        assert_eq!(store.count().unwrap(), 2);

        store.add(&strings(&["plain"]), None, None).unwrap();
        store.add(&strings(&["plain"]), None, None).unwrap();
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn identical_texts_without_metadata_count_once() {
        let (_tmp, mut store) = test_store();
        let written = store.add(&strings(&["x", "x", "y"]), None, None).unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn explicit_ids_are_used() {
        let (_tmp, mut store) = test_store();
        let ids = vec![ChunkId::from("one".to_string())];
        store.add(&strings(&["hello"]), None, Some(&ids)).unwrap();
        assert!(store.collection().get(&ids[0]).unwrap().is_some());
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let (_tmp, mut store) = test_store();
        let err = store
            .add(&strings(&["a", "b"]), Some(&[Metadata::new()]), None)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let ids = vec![ChunkId::from("x".to_string())];
        let err = store
            .add(&strings(&["a", "b"]), None, Some(&ids))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn embedder_count_mismatch_is_embedding_error() {
        let tmp = tempfile::tempdir().unwrap();
        let collection = Collection::open(tmp.path(), "docs").unwrap();
        let mut store = VectorStore::new(collection, Broken);
        let err = store.add(&strings(&["a"]), None, None).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn batches_larger_than_batch_size() {
        let (_tmp, mut store) = test_store();
        let texts: Vec<String> = (0..EMBED_BATCH_SIZE * 2 + 5)
            .map(|i| format!("line number {i}"))
            .collect();
        assert_eq!(store.add(&texts, None, None).unwrap(), texts.len());
        assert_eq!(store.count().unwrap(), texts.len());
    }

    #[test]
    fn search_on_empty_store() {
        let (_tmp, mut store) = test_store();
        assert!(store.similarity_search("anything", 3).unwrap().is_empty());
    }

    #[test]
    fn search_returns_at_most_k_sorted() {
        let (_tmp, mut store) = test_store();
        add_document(
            &mut store,
            "a.txt",
            "rust borrow checker\nrust ownership\npasta recipe\ngarden tips\n",
        );

        let results = store.similarity_search("rust borrow", 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].text, "rust borrow checker");
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert!(store.similarity_search("rust", 0).unwrap().is_empty());
    }

    #[test]
    fn results_carry_metadata() {
        let (_tmp, mut store) = test_store();
        add_document(&mut store, "a.txt", "hello\n\nworld\n");

        let results = store.similarity_search("world", 1).unwrap();
        assert_eq!(results[0].metadata["source"], "a.txt");
        assert_eq!(results[0].metadata["line"], 3);
    }

    #[test]
    fn soft_deleted_chunks_are_hidden() {
        let (_tmp, mut store) = test_store();
        add_document(&mut store, "a.txt", "hello\n");
        add_document(&mut store, "b.txt", "hello there\n");

        assert_eq!(store.mark_document_deleted("a.txt").unwrap(), 1);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.count_live().unwrap(), 1);

        let results = store.similarity_search("hello", 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata["doc_id"], "b.txt");
    }

    #[test]
    fn remove_document_deletes_only_that_document() {
        let (_tmp, mut store) = test_store();
        add_document(&mut store, "a.txt", "one\ntwo\n");
        add_document(&mut store, "b.txt", "three\n");

        assert_eq!(store.remove_document("a.txt").unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.remove_document("a.txt").unwrap(), 0);
    }

    #[test]
    fn shape_results_zips_in_order() {
        let result = QueryResult {
            ids: vec!["1".into(), "2".into()],
            documents: vec!["a".into(), "b".into()],
            metadatas: vec![Metadata::new(), Metadata::new()],
            distances: vec![0.1, 0.5],
        };
        let shaped = shape_results(result);
        assert_eq!(shaped[0].text, "a");
        assert_eq!(shaped[1].distance, 0.5);
    }
}
