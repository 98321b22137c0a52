//! Context-shaping transforms applied to the combined ranking.
//!
//! Stages run in a fixed order: page boost, adjacent expansion, image
//! supplement, final top-k. A failing best-effort stage is logged and its
//! input passes through unchanged; a failing required stage fails the call.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use fieldctx_core::traits::ChunkStore;
use fieldctx_core::{FieldSpec, Result, ScoredChunk};

pub mod adjacent;
pub mod image;
pub mod page_boost;
pub mod top_k;

pub use adjacent::AdjacentExpansion;
pub use image::ImageSupplement;
pub use page_boost::PageBoost;
pub use top_k::FinalTopKSelect;

#[async_trait]
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Required stages propagate their errors instead of degrading.
    fn required(&self) -> bool { false }

    async fn process(&self, chunks: Vec<ScoredChunk>, spec: &FieldSpec) -> Result<Vec<ScoredChunk>>;
}

pub struct PostProcessingChain {
    stages: Vec<Box<dyn PostProcessor>>,
}

impl PostProcessingChain {
    pub fn new(store: Arc<dyn ChunkStore>, lookup_timeout: Duration) -> Self {
        Self {
            stages: vec![
                Box::new(PageBoost),
                Box::new(AdjacentExpansion::new(store, lookup_timeout)),
                Box::new(ImageSupplement),
                Box::new(FinalTopKSelect),
            ],
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> { self.stages.iter().map(|s| s.name()).collect() }

    pub async fn process(&self, mut chunks: Vec<ScoredChunk>, spec: &FieldSpec) -> Result<Vec<ScoredChunk>> {
        for stage in &self.stages {
            let fallback = if stage.required() { None } else { Some(chunks.clone()) };
            let before = chunks.len();
            chunks = match (stage.process(chunks, spec).await, fallback) {
                (Ok(out), _) => out,
                (Err(e), Some(input)) => {
                    warn!(stage = stage.name(), field = %spec.field_name, error = %e, "post-processing stage skipped");
                    input
                }
                (Err(e), None) => return Err(e),
            };
            debug!(stage = stage.name(), before, after = chunks.len(), "post-processing stage done");
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldctx_core::memory::MemoryChunkIndex;
    use fieldctx_core::Chunk;

    fn chain() -> PostProcessingChain {
        PostProcessingChain::new(Arc::new(MemoryChunkIndex::new()), Duration::from_secs(1))
    }

    #[test]
    fn stages_run_in_fixed_order() {
        assert_eq!(chain().stage_names(), vec!["page_boost", "adjacent_expansion", "image_supplement", "final_top_k"]);
    }

    #[tokio::test]
    async fn required_stage_error_propagates() {
        let mut spec = FieldSpec::new("f");
        spec.final_top_k = 0;
        let mut c = ScoredChunk::new(Arc::new(Chunk::text("d", "c", Some(0), 0, "t")));
        c.combined_score = 1.0;
        assert!(chain().process(vec![c], &spec).await.is_err());
    }
}
