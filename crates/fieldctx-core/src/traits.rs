//! Collaborator interfaces consumed by the retrieval engine.
//!
//! Every method is read-only with respect to the index. Implementations own
//! their own retries; errors surfacing here are final.

use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{Chunk, HybridHit, IndexHit};

#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// OR-semantics, typo-tolerant full-text match over chunks of `doc_id`.
    async fn search_lexical(&self, doc_id: &str, query: &str, max_results: usize) -> Result<Vec<IndexHit>>;
}

#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Cosine k-nearest-neighbour search over chunk embeddings of `doc_id`.
    async fn search_semantic(&self, doc_id: &str, vector: &[f32], k: usize) -> Result<Vec<IndexHit>>;
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Chunks on `page` whose position falls inside `positions`, in position order.
    async fn fetch_by_position_range(
        &self,
        doc_id: &str,
        page: u32,
        positions: RangeInclusive<u32>,
    ) -> Result<Vec<Arc<Chunk>>>;
}

#[async_trait]
pub trait HybridIndex: Send + Sync {
    /// Single call returning a ranking already combined and normalised by the index.
    async fn search_hybrid(&self, doc_id: &str, query: &str, vector: &[f32], k: usize) -> Result<Vec<HybridHit>>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed dimension of every vector returned by `embed`.
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
