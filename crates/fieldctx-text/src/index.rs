use anyhow::Context;
use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, ConstScoreQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use fieldctx_core::memory::{auto_fuzziness, FUZZY_WEIGHT};
use fieldctx_core::traits::{ChunkStore, LexicalIndex};
use fieldctx_core::types::IndexHit;
use fieldctx_core::{Chunk, ChunkType, Error, Result};

use crate::schema::{build_schema, register_tokenizer, ChunkFields, TOKENIZER};

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Inner {
    index: Index,
    reader: IndexReader,
    fields: ChunkFields,
}

/// Lexical search and position lookups over a Tantivy index of chunks.
///
/// Every query is a conjunction of a zero-scoring `doc_id` filter and the
/// scored text clauses, so BM25 scores are never inflated by the filter.
#[derive(Clone)]
pub struct TantivyChunkIndex {
    inner: Arc<Inner>,
}

impl TantivyChunkIndex {
    /// Creates a fresh index in `index_dir`, wiping whatever was there.
    pub fn create(index_dir: &Path) -> anyhow::Result<Self> {
        if index_dir.exists() {
            std::fs::remove_dir_all(index_dir)?;
        }
        std::fs::create_dir_all(index_dir)?;
        let index = Index::create_in_dir(index_dir, build_schema())
            .with_context(|| format!("creating tantivy index in {}", index_dir.display()))?;
        Self::from_index(index)
    }

    pub fn open(index_dir: &Path) -> anyhow::Result<Self> {
        let index = Index::open_in_dir(index_dir)
            .with_context(|| format!("opening tantivy index in {}", index_dir.display()))?;
        Self::from_index(index)
    }

    pub fn open_or_create(index_dir: &Path) -> anyhow::Result<Self> {
        if index_dir.join("meta.json").exists() { Self::open(index_dir) } else { Self::create(index_dir) }
    }

    pub fn in_ram() -> anyhow::Result<Self> { Self::from_index(Index::create_in_ram(build_schema())) }

    fn from_index(index: Index) -> anyhow::Result<Self> {
        register_tokenizer(&index);
        let fields = ChunkFields::resolve(&index.schema())?;
        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        Ok(Self { inner: Arc::new(Inner { index, reader, fields }) })
    }

    /// Indexes `chunks`, replacing any chunk with the same `(doc_id, chunk_id)`.
    pub fn add_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<usize> {
        let f = self.inner.fields;
        let mut writer: IndexWriter = self.inner.index.writer(WRITER_HEAP_BYTES)?;
        for c in chunks {
            writer.delete_query(chunk_key_query(&f, &c.doc_id, &c.chunk_id))?;
            let mut doc = TantivyDocument::default();
            doc.add_text(f.chunk_id, &c.chunk_id);
            doc.add_text(f.doc_id, &c.doc_id);
            doc.add_text(f.chunk_type, c.chunk_type.as_str());
            doc.add_text(f.text, &c.text);
            if let Some(page) = c.page {
                doc.add_u64(f.page, u64::from(page));
            }
            doc.add_u64(f.position, u64::from(c.position));
            writer.add_document(doc)?;
        }
        writer.commit()?;
        self.inner.reader.reload()?;
        info!(chunks = chunks.len(), "tantivy: indexed chunks");
        Ok(chunks.len())
    }

    pub fn num_chunks(&self) -> u64 { self.inner.reader.searcher().num_docs() }
}

/// Matches exactly one chunk: `chunk_id` is only unique within its document.
fn chunk_key_query(fields: &ChunkFields, doc_id: &str, chunk_id: &str) -> Box<dyn Query> {
    let term = |field, value: &str| -> (Occur, Box<dyn Query>) {
        (Occur::Must, Box::new(TermQuery::new(Term::from_field_text(field, value), IndexRecordOption::Basic)))
    };
    Box::new(BooleanQuery::new(vec![term(fields.doc_id, doc_id), term(fields.chunk_id, chunk_id)]))
}

impl Inner {
    fn query_tokens(&self, query: &str) -> Vec<String> {
        let Some(mut analyzer) = self.index.tokenizers().get(TOKENIZER) else { return Vec::new() };
        let mut stream = analyzer.token_stream(query);
        let mut tokens = Vec::new();
        while stream.advance() {
            let text = &stream.token().text;
            if !tokens.contains(text) {
                tokens.push(text.clone());
            }
        }
        tokens
    }

    fn doc_filter(&self, doc_id: &str) -> Box<dyn Query> {
        let term = TermQuery::new(Term::from_field_text(self.fields.doc_id, doc_id), IndexRecordOption::Basic);
        Box::new(ConstScoreQuery::new(Box::new(term), 0.0))
    }

    fn text_query(&self, tokens: &[String]) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for token in tokens {
            let term = Term::from_field_text(self.fields.text, token);
            clauses.push((Occur::Should, Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs))));
            let distance = auto_fuzziness(token.chars().count());
            if distance > 0 {
                let fuzzy = FuzzyTermQuery::new(term, u8::try_from(distance).unwrap_or(2), true);
                clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(fuzzy), FUZZY_WEIGHT))));
            }
        }
        Box::new(BooleanQuery::new(clauses))
    }

    fn search(&self, doc_id: &str, query: &str, max_results: usize) -> tantivy::Result<Vec<IndexHit>> {
        let tokens = self.query_tokens(query);
        if tokens.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }
        let query = BooleanQuery::new(vec![(Occur::Must, self.doc_filter(doc_id)), (Occur::Must, self.text_query(&tokens))]);
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(max_results))?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            if let Some(chunk) = self.to_chunk(&doc) {
                hits.push(IndexHit { chunk: Arc::new(chunk), score });
            }
        }
        debug!(doc_id, tokens = tokens.len(), hits = hits.len(), "tantivy: lexical search");
        Ok(hits)
    }

    fn range(&self, doc_id: &str, page: u32, positions: &RangeInclusive<u32>) -> tantivy::Result<Vec<Arc<Chunk>>> {
        let on_page = TermQuery::new(Term::from_field_u64(self.fields.page, u64::from(page)), IndexRecordOption::Basic);
        let query = BooleanQuery::new(vec![(Occur::Must, self.doc_filter(doc_id)), (Occur::Must, Box::new(on_page))]);
        let searcher = self.reader.searcher();
        let mut chunks = Vec::new();
        for addr in searcher.search(&query, &DocSetCollector)? {
            let doc: TantivyDocument = searcher.doc(addr)?;
            if let Some(chunk) = self.to_chunk(&doc).filter(|c| positions.contains(&c.position)) {
                chunks.push(Arc::new(chunk));
            }
        }
        chunks.sort_by_key(|c| c.position);
        Ok(chunks)
    }

    fn to_chunk(&self, doc: &TantivyDocument) -> Option<Chunk> {
        let f = &self.fields;
        let text = |field| doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string);
        let number = |field| doc.get_first(field).and_then(|v| v.as_u64()).and_then(|n| u32::try_from(n).ok());
        Some(Chunk {
            chunk_id: text(f.chunk_id)?,
            doc_id: text(f.doc_id)?,
            text: text(f.text).unwrap_or_default(),
            chunk_type: text(f.chunk_type).and_then(|t| ChunkType::parse(&t)).unwrap_or_default(),
            page: number(f.page),
            position: number(f.position).unwrap_or_default(),
            embedding: None,
        })
    }
}

fn unavailable(e: &tantivy::TantivyError) -> Error { Error::index_unavailable(format!("tantivy: {e}")) }

async fn blocking<T, F>(inner: &Arc<Inner>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Inner) -> tantivy::Result<T> + Send + 'static,
{
    let inner = Arc::clone(inner);
    tokio::task::spawn_blocking(move || work(&inner))
        .await
        .map_err(|e| Error::Operation(format!("tantivy worker: {e}")))?
        .map_err(|e| unavailable(&e))
}

#[async_trait]
impl LexicalIndex for TantivyChunkIndex {
    async fn search_lexical(&self, doc_id: &str, query: &str, max_results: usize) -> Result<Vec<IndexHit>> {
        let (doc_id, query) = (doc_id.to_string(), query.to_string());
        blocking(&self.inner, move |inner| inner.search(&doc_id, &query, max_results)).await
    }
}

#[async_trait]
impl ChunkStore for TantivyChunkIndex {
    async fn fetch_by_position_range(
        &self,
        doc_id: &str,
        page: u32,
        positions: RangeInclusive<u32>,
    ) -> Result<Vec<Arc<Chunk>>> {
        let doc_id = doc_id.to_string();
        blocking(&self.inner, move |inner| inner.range(&doc_id, page, &positions)).await
    }
}
