use async_trait::async_trait;

use fieldctx_core::types::{flags, sort_ranked};
use fieldctx_core::{Error, FieldSpec, Result, ScoredChunk};

use super::PostProcessor;

/// Caps the context: top `final_top_k` text chunks plus the selected images.
pub struct FinalTopKSelect;

#[async_trait]
impl PostProcessor for FinalTopKSelect {
    fn name(&self) -> &'static str { "final_top_k" }

    fn required(&self) -> bool { true }

    async fn process(&self, chunks: Vec<ScoredChunk>, spec: &FieldSpec) -> Result<Vec<ScoredChunk>> {
        if spec.final_top_k == 0 {
            return Err(Error::invalid_config(format!("field '{}': final_top_k must be > 0", spec.field_name)));
        }
        let (mut text, mut images): (Vec<ScoredChunk>, Vec<ScoredChunk>) = chunks
            .into_iter()
            .filter(|c| !c.is_image() || c.has_flag(flags::IMAGE_SUPPLEMENT))
            .partition(|c| !c.is_image());
        sort_ranked(&mut text);
        sort_ranked(&mut images);
        text.truncate(spec.final_top_k);

        let image_cap = if spec.image_enabled { spec.max_images } else { 0 };
        if images.len() > image_cap {
            return Err(Error::Operation(format!(
                "field '{}': {} images selected, cap is {image_cap}",
                spec.field_name,
                images.len()
            )));
        }
        text.extend(images);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldctx_core::Chunk;
    use std::sync::Arc;

    fn text(id: &str, score: f32) -> ScoredChunk {
        let mut s = ScoredChunk::lexical(Arc::new(Chunk::text("d", id, Some(0), 0, "t")), score);
        s.combined_score = score;
        s
    }

    fn adjacent(id: &str) -> ScoredChunk {
        let mut s = ScoredChunk::new(Arc::new(Chunk::text("d", id, Some(0), 0, "t")));
        s.tag(flags::ADJACENT);
        s
    }

    fn image(id: &str, score: f32, selected: bool) -> ScoredChunk {
        let mut s = ScoredChunk::semantic(Arc::new(Chunk::image("d", id, Some(0), 0)), score);
        s.combined_score = score;
        if selected { s.tag(flags::IMAGE_SUPPLEMENT); }
        s
    }

    fn spec(top_k: usize) -> FieldSpec {
        let mut s = FieldSpec::new("f");
        s.final_top_k = top_k;
        s.image_enabled = true;
        s.max_images = 1;
        s
    }

    #[tokio::test]
    async fn drops_adjacent_context_first() {
        let chunks = vec![adjacent("a1"), text("t1", 0.3), adjacent("a2"), text("t2", 0.6), text("t3", 0.1)];
        let out = FinalTopKSelect.process(chunks, &spec(3)).await.expect("top k");
        let ids: Vec<&str> = out.iter().map(ScoredChunk::chunk_id).collect();
        assert_eq!(ids, vec!["t2", "t1", "t3"]);
    }

    #[tokio::test]
    async fn zero_scored_retrieved_chunk_outlasts_adjacent_context() {
        let chunks = vec![adjacent("a-adjacent"), text("z-retrieved", 0.0)];
        let out = FinalTopKSelect.process(chunks, &spec(1)).await.expect("top k");
        let ids: Vec<&str> = out.iter().map(ScoredChunk::chunk_id).collect();
        assert_eq!(ids, vec!["z-retrieved"]);
    }

    #[tokio::test]
    async fn keeps_only_selected_images_after_text() {
        let chunks = vec![image("i1", 0.9, true), image("i2", 0.95, false), text("t1", 0.2)];
        let out = FinalTopKSelect.process(chunks, &spec(5)).await.expect("top k");
        let ids: Vec<&str> = out.iter().map(ScoredChunk::chunk_id).collect();
        assert_eq!(ids, vec!["t1", "i1"]);
    }

    #[tokio::test]
    async fn image_cap_violation_is_a_hard_error() {
        let chunks = vec![image("i1", 0.9, true), image("i2", 0.8, true)];
        let result = FinalTopKSelect.process(chunks, &spec(5)).await;
        assert!(matches!(result, Err(Error::Operation(_))));
    }
}
