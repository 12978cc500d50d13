use std::{collections::HashSet, path::Path};

use tracing::{debug, info, warn};

use crate::{
    checksum::checksum_bytes,
    chunking::{Chunk, chunk_document},
    config::{DecodePolicy, IndexConfig},
    error::{Error, Result},
    state::{DocumentRecord, IndexState},
    walker::{DiscoveredFile, discover_files},
};

/// Outcome of comparing a folder scan against the previous index state.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Chunks for every new, changed or reappeared document, in file order.
    pub chunks: Vec<Chunk>,
    /// State to persist once the chunks are stored.
    pub state: IndexState,
    /// Documents with no live prior record (new, or back after deletion).
    pub added: Vec<String>,
    /// Documents whose checksum differs from the live prior record.
    pub changed: Vec<String>,
    /// Documents carried forward without re-chunking.
    pub unchanged: Vec<String>,
    /// Documents live in prior state but absent from the scan.
    pub removed: Vec<String>,
    /// Documents present on disk that could not be read or decoded.
    pub skipped: Vec<String>,
}

impl Reconciliation {
    /// Documents whose chunks must be (re)written to the collection.
    pub fn reingested(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.changed.iter())
    }
}

/// Scan `folder`, diff it against `prior`, and chunk what changed.
///
/// Unchanged documents (same checksum, not deleted) contribute no chunks.
/// Documents missing from the scan are carried into the new state with
/// `deleted = true` and their last checksum. A file that cannot be read is
/// skipped with a warning and keeps its prior record. Invalid UTF-8 follows
/// the configured [`DecodePolicy`].
pub fn reconcile(
    folder: &Path,
    prior: &IndexState,
    config: &IndexConfig,
) -> Result<Reconciliation> {
    let files = discover_files(folder)?;
    let mut result = Reconciliation::default();
    let mut seen = HashSet::with_capacity(files.len());

    for file in &files {
        let doc_id = file.doc_id();
        seen.insert(doc_id.clone());
        reconcile_file(file, doc_id, prior, config, &mut result)?;
    }

    for (path, record) in prior.iter() {
        if seen.contains(path) {
            continue;
        }
        if !record.deleted {
            debug!(path = %path, "document removed");
            result.removed.push(path.clone());
        }
        result
            .state
            .insert(path.clone(), record.clone().into_deleted());
    }

    info!(
        folder = %folder.display(),
        files = files.len(),
        added = result.added.len(),
        changed = result.changed.len(),
        unchanged = result.unchanged.len(),
        removed = result.removed.len(),
        skipped = result.skipped.len(),
        chunks = result.chunks.len(),
        "reconciled folder"
    );

    Ok(result)
}

fn reconcile_file(
    file: &DiscoveredFile,
    doc_id: String,
    prior: &IndexState,
    config: &IndexConfig,
    result: &mut Reconciliation,
) -> Result<()> {
    let prior_record = prior.get(&doc_id);

    let bytes = match std::fs::read(&file.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %file.path.display(), error = %e, "skipping unreadable file");
            skip(doc_id, prior_record, result);
            return Ok(());
        }
    };

    let checksum = checksum_bytes(&bytes);

    if let Some(record) = prior_record
        && !record.deleted
        && record.checksum == checksum
    {
        debug!(path = %doc_id, "unchanged");
        result.state.insert(doc_id.clone(), record.clone());
        result.unchanged.push(doc_id);
        return Ok(());
    }

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => match config.decode_policy {
            DecodePolicy::Fail => {
                return Err(Error::Decode {
                    path: file.path.clone(),
                });
            }
            DecodePolicy::Skip => {
                warn!(path = %file.path.display(), "skipping file that is not valid UTF-8");
                skip(doc_id, prior_record, result);
                return Ok(());
            }
        },
    };

    let chunks =
        chunk_document(&doc_id, &checksum, &config.index_version, &text);
    debug!(path = %doc_id, chunks = chunks.len(), "chunked");
    result.chunks.extend(chunks);
    result
        .state
        .insert(doc_id.clone(), DocumentRecord::live(checksum));

    if prior_record.is_some_and(|r| !r.deleted) {
        result.changed.push(doc_id);
    } else {
        result.added.push(doc_id);
    }
    Ok(())
}

fn skip(
    doc_id: String,
    prior_record: Option<&DocumentRecord>,
    result: &mut Reconciliation,
) {
    if let Some(record) = prior_record {
        result.state.insert(doc_id.clone(), record.clone());
    }
    result.skipped.push(doc_id);
}
