//! Nearest-neighbour lookup for a question.

use tracing::{debug, info};

use crate::document::{normalize_for_embedding, IndexDescriptor, QueryMatch};
use crate::embedder::Embedder;
use crate::error::{RagError, Result};
use crate::store::VectorStore;

/// Default number of matches fetched per question.
pub const DEFAULT_TOP_K: usize = 10;

/// Embeds `question` and returns up to `top_k` matches from the index, best first.
///
/// An index without relevant vectors yields an empty list, not an error.
pub fn retrieve<E, S>(
    embedder: &E,
    store: &S,
    question: &str,
    descriptor: &IndexDescriptor,
    top_k: usize,
) -> Result<Vec<QueryMatch>>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    if question.trim().is_empty() {
        return Err(RagError::config("question must not be empty"));
    }
    if top_k == 0 {
        return Err(RagError::config("top_k must be positive"));
    }

    let query = embedder.embed_one(&normalize_for_embedding(question))?;
    if query.len() != descriptor.dimension {
        return Err(RagError::DimensionMismatch {
            expected: descriptor.dimension,
            actual: query.len(),
        });
    }

    let mut matches = store.query(&descriptor.name, &query, top_k)?;
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(top_k);
    for hit in &matches {
        debug!(id = %hit.id, score = hit.score, "retrieved chunk");
    }
    info!(index = %descriptor.name, top_k, matches = matches.len(), "retrieval finished");
    Ok(matches)
}
