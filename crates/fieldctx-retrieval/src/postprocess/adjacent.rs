use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use fieldctx_core::traits::ChunkStore;
use fieldctx_core::types::{flags, sort_ranked};
use fieldctx_core::{Chunk, FieldSpec, Result, ScoredChunk};

use super::PostProcessor;
use crate::timeout::with_timeout;

/// Pulls in the text chunks immediately around each top-ranked chunk.
///
/// Anchors are the first `final_top_k` text chunks with a positive score that
/// have a page. Added neighbours score 0.0 so they never outrank a match, and
/// a chunk already in the list is never duplicated or rescored.
///
/// The window is a range of `position` ordinals on the anchor's page. Image
/// positions inside it count against `adjacent_before`/`adjacent_after` but
/// are not added, so an image neighbour yields one fewer text chunk.
pub struct AdjacentExpansion {
    store: Arc<dyn ChunkStore>,
    lookup_timeout: Duration,
}

impl AdjacentExpansion {
    pub fn new(store: Arc<dyn ChunkStore>, lookup_timeout: Duration) -> Self { Self { store, lookup_timeout } }

    async fn neighbours(&self, anchor: &Chunk, page: u32, spec: &FieldSpec) -> Result<Vec<Arc<Chunk>>> {
        let lo = anchor.position.saturating_sub(spec.adjacent_before);
        let hi = anchor.position.saturating_add(spec.adjacent_after);
        with_timeout(
            self.lookup_timeout,
            "adjacent chunk lookup",
            self.store.fetch_by_position_range(&anchor.doc_id, page, lo..=hi),
        )
        .await
    }
}

#[async_trait]
impl PostProcessor for AdjacentExpansion {
    fn name(&self) -> &'static str { "adjacent_expansion" }

    async fn process(&self, mut chunks: Vec<ScoredChunk>, spec: &FieldSpec) -> Result<Vec<ScoredChunk>> {
        if spec.adjacent_before == 0 && spec.adjacent_after == 0 {
            return Ok(chunks);
        }
        let anchors: Vec<(Arc<Chunk>, u32)> = chunks
            .iter()
            .filter(|c| !c.is_image() && c.combined_score > 0.0)
            .take(spec.final_top_k)
            .filter_map(|c| c.chunk.page.map(|p| (Arc::clone(&c.chunk), p)))
            .collect();
        if anchors.is_empty() {
            return Ok(chunks);
        }

        let fetched = try_join_all(anchors.iter().map(|(anchor, page)| self.neighbours(anchor, *page, spec))).await?;

        let mut present: HashSet<String> = chunks.iter().map(|c| c.chunk_id().to_string()).collect();
        for (neighbours, (anchor, _)) in fetched.into_iter().zip(&anchors) {
            for neighbour in neighbours {
                if neighbour.is_image() || neighbour.doc_id != anchor.doc_id {
                    continue;
                }
                if !present.insert(neighbour.chunk_id.clone()) {
                    continue;
                }
                let mut added = ScoredChunk::new(neighbour);
                added.tag(flags::ADJACENT);
                chunks.push(added);
            }
        }
        sort_ranked(&mut chunks);
        Ok(chunks)
    }
}
