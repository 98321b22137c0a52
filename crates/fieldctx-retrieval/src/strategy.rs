//! Candidate retrieval strategies sharing the `ScoredChunk` output contract.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use fieldctx_core::traits::{EmbeddingProvider, HybridIndex};
use fieldctx_core::types::sort_ranked;
use fieldctx_core::{FieldSpec, Result, ScoredChunk, StrategyKind};

use crate::combiner::ScoreCombiner;
use crate::lexical::LexicalRetriever;
use crate::orchestrator::RetrievalPhase;
use crate::semantic::{embed_query, SemanticRetriever};
use crate::timeout::with_timeout;

#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Threshold-filtered candidates ranked by `combined_score`.
    async fn candidates(&self, doc_id: &str, spec: &FieldSpec) -> Result<Vec<ScoredChunk>>;
}

/// Runs both channels concurrently, then combines them in-process.
pub struct TwoPhaseStrategy {
    lexical: LexicalRetriever,
    semantic: SemanticRetriever,
    combiner: ScoreCombiner,
    degrade_to_single_channel: bool,
}

impl TwoPhaseStrategy {
    pub fn new(
        lexical: LexicalRetriever,
        semantic: SemanticRetriever,
        combiner: ScoreCombiner,
        degrade_to_single_channel: bool,
    ) -> Self {
        Self { lexical, semantic, combiner, degrade_to_single_channel }
    }
}

#[async_trait]
impl RetrievalStrategy for TwoPhaseStrategy {
    fn kind(&self) -> StrategyKind { StrategyKind::TwoPhase }

    async fn candidates(&self, doc_id: &str, spec: &FieldSpec) -> Result<Vec<ScoredChunk>> {
        let (lexical, semantic) =
            tokio::join!(self.lexical.search(doc_id, spec, true), self.semantic.search(doc_id, spec, true));
        debug!(phase = ?RetrievalPhase::Combining, "both channels returned");

        let (lexical, semantic) = match (lexical, semantic) {
            (Ok(l), Ok(s)) => (l, s),
            (Err(e), Err(other)) => {
                warn!(field = %spec.field_name, error = %other, "semantic channel failed");
                return Err(e);
            }
            (Err(e), Ok(s)) if self.degrade_to_single_channel && e.is_channel_failure() => {
                warn!(field = %spec.field_name, error = %e, "lexical channel failed, using semantic results only");
                (Vec::new(), s)
            }
            (Ok(l), Err(e)) if self.degrade_to_single_channel && e.is_channel_failure() => {
                warn!(field = %spec.field_name, error = %e, "semantic channel failed, using lexical results only");
                (l, Vec::new())
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(e),
        };

        Ok(self.combiner.combine(lexical, semantic, spec))
    }
}

/// Delegates combination to an index with native hybrid scoring.
///
/// The index decides normalisation and weighting; `found_by_both` is never
/// set. Per-channel thresholds are applied after combination to whatever raw
/// channel scores the index reports.
pub struct NativeHybridStrategy {
    index: Arc<dyn HybridIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
    timeout: Duration,
}

impl NativeHybridStrategy {
    pub fn new(index: Arc<dyn HybridIndex>, embedder: Arc<dyn EmbeddingProvider>, k: usize, timeout: Duration) -> Self {
        Self { index, embedder, k, timeout }
    }
}

#[async_trait]
impl RetrievalStrategy for NativeHybridStrategy {
    fn kind(&self) -> StrategyKind { StrategyKind::NativeHybrid }

    async fn candidates(&self, doc_id: &str, spec: &FieldSpec) -> Result<Vec<ScoredChunk>> {
        let query = spec.lexical_query();
        let semantic_text = if spec.has_semantic_query() { spec.semantic_query_text.clone() } else { query.clone() };
        let search = async {
            let vector = embed_query(self.embedder.as_ref(), &semantic_text).await?;
            self.index.search_hybrid(doc_id, &query, &vector, self.k).await
        };
        let hits = with_timeout(self.timeout, "hybrid search", search).await?;
        debug!(phase = ?RetrievalPhase::Combining, hits = hits.len(), "hybrid search returned");

        let mut ranked: Vec<ScoredChunk> = hits
            .into_iter()
            .filter(|h| h.chunk.doc_id == doc_id)
            .filter_map(|h| {
                let lexical = h.lexical_score.unwrap_or(0.0);
                let semantic = h.semantic_score.unwrap_or(0.0).clamp(0.0, 1.0);
                if lexical < spec.lexical_threshold && semantic < spec.semantic_threshold {
                    return None;
                }
                let mut c = ScoredChunk::new(h.chunk);
                c.lexical_score = lexical;
                c.semantic_score = semantic;
                c.combined_score = h.score;
                Some(c)
            })
            .collect();
        sort_ranked(&mut ranked);
        Ok(ranked)
    }
}
