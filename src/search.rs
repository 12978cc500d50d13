use serde::Serialize;

use crate::{
    chunking::Metadata,
    embedding::Embedder,
    error::Result,
    vector_store::{RetrievalResult, VectorStore},
};

/// Run a query against the store.
///
/// A blank question returns no results without touching the embedder.
pub fn execute_query<E: Embedder>(
    store: &mut VectorStore<E>,
    question: &str,
    k: usize,
) -> Result<Vec<RetrievalResult>> {
    if question.trim().is_empty() {
        return Ok(Vec::new());
    }
    store.similarity_search(question, k)
}

/// One result line: `distance :: text | metadata`.
pub fn render_result(result: &RetrievalResult) -> String {
    format!(
        "{:.4} :: {} | {}",
        result.distance,
        result.text,
        render_metadata(&result.metadata)
    )
}

fn render_metadata(metadata: &Metadata) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in results {
        println!("{}", render_result(r));
    }
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [RetrievalResult],
}

/// Results as a JSON document.
pub fn render_json(results: &[RetrievalResult], query: &str) -> Result<String> {
    let output = QueryOutput {
        query,
        result_count: results.len(),
        results,
    };
    Ok(serde_json::to_string(&output)?)
}

/// Format results as JSON output.
pub fn format_json(results: &[RetrievalResult], query: &str) -> Result<()> {
    println!("{}", render_json(results, query)?);
    Ok(())
}
