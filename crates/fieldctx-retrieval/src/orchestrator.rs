//! The single entry point: `retrieve(doc_id, field_spec)`.
//!
//! `Idle -> Retrieving -> Combining -> PostProcessing -> Done`, linear once the
//! strategy is chosen. No retries here; index clients own those. Dropping the
//! returned future cancels in-flight retriever calls, and since retrieval is
//! read-only that is always safe.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Instrument};

use fieldctx_core::config::RetrievalConfig;
use fieldctx_core::traits::{ChunkStore, EmbeddingProvider, HybridIndex, LexicalIndex, SemanticIndex};
use fieldctx_core::{Error, FieldSpec, Result, ScoredChunk, StrategyKind};

use crate::combiner::ScoreCombiner;
use crate::lexical::LexicalRetriever;
use crate::postprocess::PostProcessingChain;
use crate::semantic::SemanticRetriever;
use crate::strategy::{NativeHybridStrategy, RetrievalStrategy, TwoPhaseStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPhase {
    Idle,
    Retrieving,
    Combining,
    PostProcessing,
    Done,
}

pub struct RetrievalOrchestrator {
    default_strategy: StrategyKind,
    two_phase: Option<Arc<dyn RetrievalStrategy>>,
    native_hybrid: Option<Arc<dyn RetrievalStrategy>>,
    chain: PostProcessingChain,
}

impl RetrievalOrchestrator {
    pub fn builder(config: RetrievalConfig) -> OrchestratorBuilder { OrchestratorBuilder::new(config) }

    pub fn default_strategy(&self) -> StrategyKind { self.default_strategy }

    /// The strategy for `spec`: its override, else the configured default.
    fn strategy_for(&self, spec: &FieldSpec) -> Result<&Arc<dyn RetrievalStrategy>> {
        let kind = spec.strategy.unwrap_or(self.default_strategy);
        let strategy = match kind {
            StrategyKind::TwoPhase => self.two_phase.as_ref(),
            StrategyKind::NativeHybrid => self.native_hybrid.as_ref(),
        };
        strategy.ok_or_else(|| {
            Error::invalid_config(format!("field '{}': strategy {kind:?} is not available", spec.field_name))
        })
    }

    /// Context chunks for one field of one document. An empty list means no
    /// relevant content was found.
    pub async fn retrieve(&self, doc_id: &str, spec: &FieldSpec) -> Result<Vec<ScoredChunk>> {
        let span = info_span!("retrieve", doc_id = %doc_id, field = %spec.field_name);
        async move {
            debug!(phase = ?RetrievalPhase::Idle, "validating request");
            if doc_id.trim().is_empty() {
                return Err(Error::invalid_config("doc_id must not be empty"));
            }
            spec.validate()?;
            let strategy = self.strategy_for(spec)?;

            debug!(phase = ?RetrievalPhase::Retrieving, strategy = ?strategy.kind());
            let candidates = strategy.candidates(doc_id, spec).await?;
            if candidates.is_empty() {
                info!(strategy = ?strategy.kind(), "no relevant content found");
                return Ok(Vec::new());
            }

            debug!(phase = ?RetrievalPhase::PostProcessing, candidates = candidates.len());
            let selected = self.chain.process(candidates, spec).await?;

            let images = selected.iter().filter(|c| c.is_image()).count();
            debug!(phase = ?RetrievalPhase::Done);
            info!(strategy = ?strategy.kind(), text = selected.len() - images, images, "context assembled");
            Ok(selected)
        }
        .instrument(span)
        .await
    }
}

/// Wires index clients into strategies. Two-phase needs lexical, semantic and
/// an embedder; native hybrid needs a hybrid index and an embedder. The chunk
/// store is always required.
pub struct OrchestratorBuilder {
    config: RetrievalConfig,
    lexical: Option<Arc<dyn LexicalIndex>>,
    semantic: Option<Arc<dyn SemanticIndex>>,
    hybrid: Option<Arc<dyn HybridIndex>>,
    store: Option<Arc<dyn ChunkStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl OrchestratorBuilder {
    fn new(config: RetrievalConfig) -> Self {
        Self { config, lexical: None, semantic: None, hybrid: None, store: None, embedder: None }
    }

    #[must_use]
    pub fn lexical(mut self, index: Arc<dyn LexicalIndex>) -> Self {
        self.lexical = Some(index);
        self
    }

    #[must_use]
    pub fn semantic(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.semantic = Some(index);
        self
    }

    #[must_use]
    pub fn hybrid(mut self, index: Arc<dyn HybridIndex>) -> Self {
        self.hybrid = Some(index);
        self
    }

    #[must_use]
    pub fn chunk_store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn build(self) -> Result<RetrievalOrchestrator> {
        let config = self.config;
        config.validate()?;
        let store = self.store.ok_or_else(|| Error::invalid_config("a chunk store is required"))?;
        let lexical_timeout = Duration::from_millis(config.lexical_timeout_ms);
        let semantic_timeout = Duration::from_millis(config.semantic_timeout_ms);

        let two_phase = match (self.lexical, self.semantic, self.embedder.clone()) {
            (Some(lexical), Some(semantic), Some(embedder)) => {
                let strategy = TwoPhaseStrategy::new(
                    LexicalRetriever::new(lexical, config.lexical_candidates, lexical_timeout),
                    SemanticRetriever::new(semantic, embedder, config.semantic_candidates, semantic_timeout),
                    ScoreCombiner::from_config(&config),
                    config.degrade_to_single_channel,
                );
                Some(Arc::new(strategy) as Arc<dyn RetrievalStrategy>)
            }
            _ => None,
        };
        let native_hybrid = match (self.hybrid, self.embedder) {
            (Some(index), Some(embedder)) => {
                let k = config.lexical_candidates.max(config.semantic_candidates);
                let timeout = lexical_timeout.max(semantic_timeout);
                Some(Arc::new(NativeHybridStrategy::new(index, embedder, k, timeout)) as Arc<dyn RetrievalStrategy>)
            }
            _ => None,
        };

        let available = match config.strategy {
            StrategyKind::TwoPhase => two_phase.is_some(),
            StrategyKind::NativeHybrid => native_hybrid.is_some(),
        };
        if !available {
            return Err(Error::invalid_config(format!(
                "default strategy {:?} is missing its index clients or embedder",
                config.strategy
            )));
        }

        Ok(RetrievalOrchestrator {
            default_strategy: config.strategy,
            two_phase,
            native_hybrid,
            chain: PostProcessingChain::new(store, Duration::from_millis(config.lookup_timeout_ms)),
        })
    }
}
