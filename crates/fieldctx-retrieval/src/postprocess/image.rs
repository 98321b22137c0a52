use async_trait::async_trait;

use fieldctx_core::types::{flags, rank_order};
use fieldctx_core::{FieldSpec, Result, ScoredChunk};

use super::PostProcessor;

/// Selects the best `max_images` image chunks, or strips images when disabled.
pub struct ImageSupplement;

#[async_trait]
impl PostProcessor for ImageSupplement {
    fn name(&self) -> &'static str { "image_supplement" }

    async fn process(&self, mut chunks: Vec<ScoredChunk>, spec: &FieldSpec) -> Result<Vec<ScoredChunk>> {
        if !spec.image_enabled {
            chunks.retain(|c| !c.is_image());
            return Ok(chunks);
        }
        let mut images: Vec<&mut ScoredChunk> = chunks.iter_mut().filter(|c| c.is_image()).collect();
        images.sort_by(|a, b| rank_order(a, b));
        for image in images.into_iter().take(spec.max_images) {
            image.tag(flags::IMAGE_SUPPLEMENT);
        }
        Ok(chunks)
    }
}
