use async_trait::async_trait;

use fieldctx_core::types::{flags, sort_ranked};
use fieldctx_core::{FieldSpec, Result, ScoredChunk};

use super::PostProcessor;

/// Adds `page_boost_amount` to chunks on prioritised pages, then re-ranks.
pub struct PageBoost;

#[async_trait]
impl PostProcessor for PageBoost {
    fn name(&self) -> &'static str { "page_boost" }

    async fn process(&self, mut chunks: Vec<ScoredChunk>, spec: &FieldSpec) -> Result<Vec<ScoredChunk>> {
        if spec.page_boost_pages.is_empty() {
            return Ok(chunks);
        }
        for c in chunks.iter_mut().filter(|c| spec.is_boosted_page(c.chunk.page)) {
            c.combined_score += spec.page_boost_amount;
            c.tag(flags::PAGE_BOOST);
        }
        sort_ranked(&mut chunks);
        Ok(chunks)
    }
}
