//! Domain types shared by the retrievers, backends and post-processors.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub type ChunkId = String;

/// Diagnostic tags written by post-processors. Never read upstream.
pub mod flags {
    pub const PAGE_BOOST: &str = "page_boost";
    pub const ADJACENT: &str = "adjacent";
    pub const IMAGE_SUPPLEMENT: &str = "image_supplement";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    #[default]
    Text,
    Image,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Text => "text",
            ChunkType::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ChunkType::Text),
            "image" => Some(ChunkType::Image),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// An immutable, indexed unit of document content.
///
/// - `chunk_id`: unique within the owning document's index
/// - `text`: empty for pure-image chunks
/// - `page`: 0-indexed page number, if known
/// - `position`: ordinal within the page; neighbours differ by one
/// - `embedding`: present only when the chunk is indexed for semantic search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub chunk_type: ChunkType,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn text(doc_id: &str, chunk_id: &str, page: Option<u32>, position: u32, text: &str) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            doc_id: doc_id.to_string(),
            text: text.to_string(),
            chunk_type: ChunkType::Text,
            page,
            position,
            embedding: None,
        }
    }

    pub fn image(doc_id: &str, chunk_id: &str, page: Option<u32>, position: u32) -> Self {
        Self { chunk_type: ChunkType::Image, ..Self::text(doc_id, chunk_id, page, position, "") }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn is_image(&self) -> bool { self.chunk_type == ChunkType::Image }
}

/// A chunk plus the retrieval metadata accumulated by one `retrieve` call.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub lexical_score: f32,
    pub semantic_score: f32,
    pub combined_score: f32,
    pub found_by_both: bool,
    pub flags: BTreeSet<String>,
}

impl ScoredChunk {
    pub fn new(chunk: Arc<Chunk>) -> Self {
        Self {
            chunk,
            lexical_score: 0.0,
            semantic_score: 0.0,
            combined_score: 0.0,
            found_by_both: false,
            flags: BTreeSet::new(),
        }
    }

    pub fn lexical(chunk: Arc<Chunk>, score: f32) -> Self { Self { lexical_score: score, ..Self::new(chunk) } }

    pub fn semantic(chunk: Arc<Chunk>, score: f32) -> Self { Self { semantic_score: score, ..Self::new(chunk) } }

    pub fn chunk_id(&self) -> &str { &self.chunk.chunk_id }

    pub fn is_image(&self) -> bool { self.chunk.is_image() }

    pub fn has_flag(&self, flag: &str) -> bool { self.flags.contains(flag) }

    pub fn tag(&mut self, flag: &str) { self.flags.insert(flag.to_string()); }

    /// One-line summary for logs: id, page, type, score and flags.
    pub fn explain(&self) -> String {
        let page = self.chunk.page.map_or_else(|| "-".to_string(), |p| p.to_string());
        let flags: Vec<&str> = self.flags.iter().map(String::as_str).collect();
        format!(
            "{} page={} type={} score={:.4} lex={:.4} sem={:.4} both={} flags=[{}]",
            self.chunk.chunk_id,
            page,
            self.chunk.chunk_type,
            self.combined_score,
            self.lexical_score,
            self.semantic_score,
            self.found_by_both,
            flags.join(","),
        )
    }
}

/// Descending by `combined_score`. At equal score retrieved chunks come before
/// adjacent context, then ascending `chunk_id`.
pub fn rank_order(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then_with(|| a.has_flag(flags::ADJACENT).cmp(&b.has_flag(flags::ADJACENT)))
        .then_with(|| a.chunk_id().cmp(b.chunk_id()))
}

pub fn sort_ranked(chunks: &mut [ScoredChunk]) { chunks.sort_by(rank_order); }

/// A raw hit returned by an index client.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// A hit from an index that combines channels natively.
///
/// `score` is the engine's combined score; the per-channel raw scores are
/// reported when the engine exposes them.
#[derive(Debug, Clone)]
pub struct HybridHit {
    pub chunk: Arc<Chunk>,
    pub score: f32,
    pub lexical_score: Option<f32>,
    pub semantic_score: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, score: f32) -> ScoredChunk {
        let mut s = ScoredChunk::new(Arc::new(Chunk::text("d", id, Some(0), 0, "x")));
        s.combined_score = score;
        s
    }

    #[test]
    fn rank_order_breaks_ties_by_chunk_id() {
        let mut v = vec![scored("c", 0.5), scored("a", 0.5), scored("b", 0.9)];
        sort_ranked(&mut v);
        let ids: Vec<&str> = v.iter().map(ScoredChunk::chunk_id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn adjacent_context_ranks_after_retrieved_chunk_at_equal_score() {
        let mut adjacent = scored("a-adjacent", 0.0);
        adjacent.tag(flags::ADJACENT);
        let mut v = vec![adjacent, scored("z-retrieved", 0.0)];
        sort_ranked(&mut v);
        let ids: Vec<&str> = v.iter().map(ScoredChunk::chunk_id).collect();
        assert_eq!(ids, vec!["z-retrieved", "a-adjacent"]);
    }

    #[test]
    fn explain_lists_flags() {
        let mut s = scored("c1", 0.25);
        s.tag(flags::ADJACENT);
        s.tag(flags::PAGE_BOOST);
        let line = s.explain();
        assert!(line.starts_with("c1 page=0 type=text score=0.2500"));
        assert!(line.ends_with("flags=[adjacent,page_boost]"));
    }

    #[test]
    fn chunk_jsonl_defaults() {
        let c: Chunk = serde_json::from_str(r#"{"chunk_id":"i1","doc_id":"d","chunk_type":"image","page":2}"#)
            .expect("parse");
        assert!(c.is_image());
        assert_eq!(c.position, 0);
        assert!(c.text.is_empty());
        assert!(c.embedding.is_none());
    }
}
