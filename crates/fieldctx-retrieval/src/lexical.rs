use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use fieldctx_core::traits::LexicalIndex;
use fieldctx_core::{FieldSpec, Result, ScoredChunk};

use crate::timeout::with_timeout;

/// Keyword/fuzzy channel. Scores are the index's raw relevance scores.
pub struct LexicalRetriever {
    index: Arc<dyn LexicalIndex>,
    max_candidates: usize,
    timeout: Duration,
}

impl LexicalRetriever {
    pub fn new(index: Arc<dyn LexicalIndex>, max_candidates: usize, timeout: Duration) -> Self {
        Self { index, max_candidates, timeout }
    }

    /// Candidates for `spec` within `doc_id`. With `apply_threshold`, hits
    /// scoring below `spec.lexical_threshold` are dropped.
    pub async fn search(&self, doc_id: &str, spec: &FieldSpec, apply_threshold: bool) -> Result<Vec<ScoredChunk>> {
        let query = spec.lexical_query();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let hits = with_timeout(
            self.timeout,
            "lexical search",
            self.index.search_lexical(doc_id, &query, self.max_candidates),
        )
        .await?;
        let total = hits.len();
        let results: Vec<ScoredChunk> = hits
            .into_iter()
            .filter(|h| h.chunk.doc_id == doc_id)
            .filter(|h| !apply_threshold || h.score >= spec.lexical_threshold)
            .map(|h| ScoredChunk::lexical(h.chunk, h.score))
            .collect();
        debug!(field = %spec.field_name, hits = total, kept = results.len(), "lexical search");
        Ok(results)
    }
}
