use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    chunking::{Chunk, Metadata},
    collection::Collection,
    config::IndexConfig,
    embedding::Embedder,
    error::Result,
    incremental::Reconciliation,
    state::{IndexState, StateStore},
    vector_store::VectorStore,
};

/// What one ingestion run did to the collection.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents_added: usize,
    pub documents_changed: usize,
    pub documents_unchanged: usize,
    pub documents_removed: usize,
    pub documents_skipped: usize,
    pub chunks_added: usize,
    pub chunks_replaced: usize,
    pub chunks_flagged_deleted: usize,
}

/// Write a reconciliation into the store.
///
/// For each new or changed document, its previous chunks are removed and its
/// current chunks added, so a document that shrank leaves no stale lines.
/// Chunks of removed documents are flagged deleted. Ids are positional,
/// so running this again after a partial failure overwrites instead of
/// duplicating.
///
/// The caller persists `reconciliation.state` only after this succeeds.
pub fn apply<E: Embedder>(
    store: &mut VectorStore<E>,
    reconciliation: &Reconciliation,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        documents_added: reconciliation.added.len(),
        documents_changed: reconciliation.changed.len(),
        documents_unchanged: reconciliation.unchanged.len(),
        documents_removed: reconciliation.removed.len(),
        documents_skipped: reconciliation.skipped.len(),
        ..Default::default()
    };

    let mut by_document: HashMap<&str, Vec<&Chunk>> = HashMap::new();
    for chunk in &reconciliation.chunks {
        by_document
            .entry(chunk.metadata.doc_id.as_str())
            .or_default()
            .push(chunk);
    }

    for doc_id in reconciliation.reingested() {
        report.chunks_replaced += store.remove_document(doc_id)?;

        let Some(chunks) = by_document.get(doc_id.as_str()) else {
            debug!(path = %doc_id, "no chunks");
            continue;
        };
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let metadatas: Vec<Metadata> =
            chunks.iter().map(|c| c.metadata.to_metadata()).collect();
        report.chunks_added += store.add(&texts, Some(&metadatas), None)?;
    }

    for doc_id in &reconciliation.removed {
        report.chunks_flagged_deleted += store.mark_document_deleted(doc_id)?;
    }

    info!(
        chunks_added = report.chunks_added,
        chunks_replaced = report.chunks_replaced,
        chunks_flagged_deleted = report.chunks_flagged_deleted,
        "ingested"
    );
    Ok(report)
}

/// Drop the collection so the next reconcile against the returned state
/// rebuilds it from scratch.
///
/// Every prior record is marked deleted and saved before the collection is
/// dropped. A run that fails after this point leaves a state that makes the
/// next build re-ingest every file still present. Records of files that are
/// gone keep their checksum.
pub fn reset(
    state_store: &StateStore,
    prior: IndexState,
    config: &IndexConfig,
) -> Result<IndexState> {
    let state = prior.into_all_deleted();
    state_store.save(&state)?;
    if Collection::delete_collection(&config.db_path, &config.collection_name)? {
        info!(collection = %config.collection_name, "dropped collection");
    }
    Ok(state)
}
