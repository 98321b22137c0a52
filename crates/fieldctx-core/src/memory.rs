//! In-memory chunk index implementing every collaborator trait.
//!
//! Lexical search is BM25 with AUTO fuzziness, semantic search is exact
//! cosine similarity, and the native hybrid call min-max normalises both
//! channels and averages them. Used by the CLI `memory` backend and tests.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::traits::{ChunkStore, HybridIndex, LexicalIndex, SemanticIndex};
use crate::types::{Chunk, HybridHit, IndexHit};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;
/// Weight of a fuzzy (non-exact) term match relative to an exact one.
pub const FUZZY_WEIGHT: f32 = 0.5;

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Edit distance tolerated for a query token of `len` characters.
pub fn auto_fuzziness(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

struct Posting {
    chunk: Arc<Chunk>,
    term_freqs: HashMap<String, u32>,
    len: usize,
}

#[derive(Default)]
struct DocIndex {
    postings: Vec<Posting>,
    doc_freq: HashMap<String, u32>,
}

impl DocIndex {
    fn add(&mut self, chunk: Arc<Chunk>) {
        let tokens = tokenize(&chunk.text);
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for t in &tokens { *term_freqs.entry(t.clone()).or_default() += 1; }
        for t in term_freqs.keys() { *self.doc_freq.entry(t.clone()).or_default() += 1; }
        self.postings.push(Posting { chunk, term_freqs, len: tokens.len() });
    }

    fn avg_len(&self) -> f32 {
        if self.postings.is_empty() { return 0.0; }
        self.postings.iter().map(|p| p.len).sum::<usize>() as f32 / self.postings.len() as f32
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.postings.len() as f32;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Index terms matching `q`, with exact matches weighted 1 and fuzzy ones lower.
    fn expand(&self, q: &str) -> Vec<(String, f32)> {
        let max_edits = auto_fuzziness(q.chars().count());
        self.doc_freq
            .keys()
            .filter_map(|t| {
                if t == q {
                    Some((t.clone(), 1.0))
                } else if max_edits > 0 && strsim::levenshtein(q, t) <= max_edits {
                    Some((t.clone(), FUZZY_WEIGHT))
                } else {
                    None
                }
            })
            .collect()
    }

    fn bm25(&self, query: &str, max_results: usize) -> Vec<IndexHit> {
        let mut seen = HashSet::new();
        let expanded: Vec<(String, f32, f32)> = tokenize(query)
            .into_iter()
            .filter(|q| seen.insert(q.clone()))
            .flat_map(|q| self.expand(&q))
            .map(|(t, w)| { let idf = self.idf(&t); (t, w, idf) })
            .collect();
        if expanded.is_empty() { return Vec::new(); }
        let avg_len = self.avg_len().max(1.0);
        let mut hits: Vec<IndexHit> = self
            .postings
            .iter()
            .filter_map(|p| {
                let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * p.len as f32 / avg_len);
                let score: f32 = expanded
                    .iter()
                    .filter_map(|(t, w, idf)| {
                        let tf = *p.term_freqs.get(t)? as f32;
                        Some(w * idf * tf * (BM25_K1 + 1.0) / (tf + norm))
                    })
                    .sum();
                (score > 0.0).then(|| IndexHit { chunk: Arc::clone(&p.chunk), score })
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(max_results);
        hits
    }

    fn knn(&self, vector: &[f32], k: usize) -> Vec<IndexHit> {
        let mut hits: Vec<IndexHit> = self
            .postings
            .iter()
            .filter_map(|p| {
                let emb = p.chunk.embedding.as_ref()?;
                if emb.len() != vector.len() { return None; }
                Some(IndexHit { chunk: Arc::clone(&p.chunk), score: cosine(vector, emb) })
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }
}

fn sort_hits(hits: &mut [IndexHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id)));
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

/// Min-max normalise into [0, 1]; a constant batch maps to 1.0.
fn min_max(hits: &[IndexHit]) -> HashMap<String, (f32, f32)> {
    let max = hits.iter().map(|h| h.score).fold(f32::MIN, f32::max);
    let min = hits.iter().map(|h| h.score).fold(f32::MAX, f32::min);
    let range = max - min;
    hits.iter()
        .map(|h| {
            let n = if range > 0.0 { (h.score - min) / range } else { 1.0 };
            (h.chunk.chunk_id.clone(), (h.score, n))
        })
        .collect()
}

#[derive(Default)]
pub struct MemoryChunkIndex {
    docs: HashMap<String, DocIndex>,
}

impl MemoryChunkIndex {
    pub fn new() -> Self { Self::default() }

    pub fn from_chunks<I: IntoIterator<Item = Chunk>>(chunks: I) -> Self {
        let mut index = Self::new();
        for c in chunks { index.add_chunk(c); }
        index
    }

    /// Load one JSON `Chunk` per line; blank lines are skipped.
    pub fn from_jsonl(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut index = Self::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() { continue; }
            let chunk: Chunk = serde_json::from_str(line).with_context(|| format!("{}:{}", path.display(), i + 1))?;
            index.add_chunk(chunk);
        }
        Ok(index)
    }

    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.docs.entry(chunk.doc_id.clone()).or_default().add(Arc::new(chunk));
    }

    pub fn len(&self) -> usize { self.docs.values().map(|d| d.postings.len()).sum() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn doc(&self, doc_id: &str) -> Option<&DocIndex> { self.docs.get(doc_id) }
}

#[async_trait]
impl LexicalIndex for MemoryChunkIndex {
    async fn search_lexical(&self, doc_id: &str, query: &str, max_results: usize) -> Result<Vec<IndexHit>> {
        Ok(self.doc(doc_id).map(|d| d.bm25(query, max_results)).unwrap_or_default())
    }
}

#[async_trait]
impl SemanticIndex for MemoryChunkIndex {
    async fn search_semantic(&self, doc_id: &str, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        Ok(self.doc(doc_id).map(|d| d.knn(vector, k)).unwrap_or_default())
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkIndex {
    async fn fetch_by_position_range(
        &self,
        doc_id: &str,
        page: u32,
        positions: RangeInclusive<u32>,
    ) -> Result<Vec<Arc<Chunk>>> {
        let Some(doc) = self.doc(doc_id) else { return Ok(Vec::new()) };
        let mut out: Vec<Arc<Chunk>> = doc
            .postings
            .iter()
            .filter(|p| p.chunk.page == Some(page) && positions.contains(&p.chunk.position))
            .map(|p| Arc::clone(&p.chunk))
            .collect();
        out.sort_by_key(|c| c.position);
        Ok(out)
    }
}

#[async_trait]
impl HybridIndex for MemoryChunkIndex {
    async fn search_hybrid(&self, doc_id: &str, query: &str, vector: &[f32], k: usize) -> Result<Vec<HybridHit>> {
        let Some(doc) = self.doc(doc_id) else { return Ok(Vec::new()) };
        let lexical = doc.bm25(query, usize::MAX);
        let semantic = doc.knn(vector, usize::MAX);
        let lex_norm = min_max(&lexical);
        let sem_norm = min_max(&semantic);
        let mut chunks: HashMap<String, Arc<Chunk>> = HashMap::new();
        for h in lexical.iter().chain(semantic.iter()) {
            chunks.entry(h.chunk.chunk_id.clone()).or_insert_with(|| Arc::clone(&h.chunk));
        }
        let mut hits: Vec<HybridHit> = chunks
            .into_iter()
            .map(|(id, chunk)| {
                let l = lex_norm.get(&id).copied();
                let s = sem_norm.get(&id).copied();
                let score = (l.map_or(0.0, |(_, n)| n) + s.map_or(0.0, |(_, n)| n)) / 2.0;
                HybridHit { chunk, score, lexical_score: l.map(|(raw, _)| raw), semantic_score: s.map(|(raw, _)| raw) }
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id)));
        hits.truncate(k);
        Ok(hits)
    }
}
