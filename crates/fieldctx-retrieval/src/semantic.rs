use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use fieldctx_core::traits::{EmbeddingProvider, SemanticIndex};
use fieldctx_core::{Error, FieldSpec, Result, ScoredChunk};

use crate::timeout::with_timeout;

/// Nearest-neighbour channel over chunk embeddings.
pub struct SemanticRetriever {
    index: Arc<dyn SemanticIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
    timeout: Duration,
}

impl SemanticRetriever {
    pub fn new(index: Arc<dyn SemanticIndex>, embedder: Arc<dyn EmbeddingProvider>, k: usize, timeout: Duration) -> Self {
        Self { index, embedder, k, timeout }
    }

    /// Candidates for `spec` within `doc_id`, similarity clamped to [0, 1].
    /// With `apply_threshold`, hits below `spec.semantic_threshold` are dropped.
    pub async fn search(&self, doc_id: &str, spec: &FieldSpec, apply_threshold: bool) -> Result<Vec<ScoredChunk>> {
        if !spec.has_semantic_query() {
            return Ok(Vec::new());
        }
        let search = async {
            let vector = embed_query(self.embedder.as_ref(), &spec.semantic_query_text).await?;
            self.index.search_semantic(doc_id, &vector, self.k).await
        };
        let hits = with_timeout(self.timeout, "semantic search", search).await?;
        let total = hits.len();
        let results: Vec<ScoredChunk> = hits
            .into_iter()
            .filter(|h| h.chunk.doc_id == doc_id)
            .map(|h| {
                let score = h.score.clamp(0.0, 1.0);
                (h, score)
            })
            .filter(|(_, score)| !apply_threshold || *score >= spec.semantic_threshold)
            .map(|(h, score)| ScoredChunk::semantic(h.chunk, score))
            .collect();
        debug!(field = %spec.field_name, hits = total, kept = results.len(), "semantic search");
        Ok(results)
    }
}

/// Embed `text`, checking the provider's declared dimension.
pub async fn embed_query(embedder: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let vector = embedder.embed(text).await?;
    if vector.len() != embedder.dim() {
        return Err(Error::embedding(format!(
            "query vector has dimension {}, provider declares {}",
            vector.len(),
            embedder.dim()
        )));
    }
    Ok(vector)
}
