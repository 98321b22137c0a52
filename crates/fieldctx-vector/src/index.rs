use anyhow::{anyhow, Context};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, UInt32Type};
use arrow_array::{Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use fieldctx_core::traits::SemanticIndex;
use fieldctx_core::types::IndexHit;
use fieldctx_core::{Chunk, ChunkType, Error, Result};

use crate::schema::build_chunk_schema;
use crate::table::{ensure_table, open_db};

/// Cosine k-NN over the `vector` column, filtered to one document.
pub struct LanceChunkIndex {
    conn: Connection,
    table_name: String,
    dim: usize,
}

impl LanceChunkIndex {
    pub async fn open(uri: &str, table_name: &str, dim: usize) -> anyhow::Result<Self> {
        let conn = open_db(uri).await.with_context(|| format!("connecting to lancedb at {uri}"))?;
        ensure_table(&conn, table_name, build_chunk_schema(i32::try_from(dim)?)).await?;
        Ok(Self { conn, table_name: table_name.to_string(), dim })
    }

    pub fn dim(&self) -> usize { self.dim }

    /// Writes chunks that carry an embedding of the index dimension, replacing
    /// rows with the same `(doc_id, chunk_id)`; others are skipped. Returns the
    /// number written.
    pub async fn add_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<usize> {
        let (embedded, skipped): (Vec<&Chunk>, Vec<&Chunk>) =
            chunks.iter().partition(|c| c.embedding.as_ref().is_some_and(|v| v.len() == self.dim));
        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), dim = self.dim, "lance: chunks without a matching embedding were not indexed");
        }
        if embedded.is_empty() {
            return Ok(0);
        }
        let dim = i32::try_from(self.dim)?;
        let schema = build_chunk_schema(dim);
        let vectors = embedded.iter().map(|c| c.embedding.as_ref().map(|v| v.iter().copied().map(Some).collect::<Vec<_>>()));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from_iter_values(embedded.iter().map(|c| c.chunk_id.as_str()))),
                Arc::new(StringArray::from_iter_values(embedded.iter().map(|c| c.doc_id.as_str()))),
                Arc::new(StringArray::from_iter_values(embedded.iter().map(|c| c.text.as_str()))),
                Arc::new(StringArray::from_iter_values(embedded.iter().map(|c| c.chunk_type.as_str()))),
                Arc::new(UInt32Array::from(embedded.iter().map(|c| c.page).collect::<Vec<_>>())),
                Arc::new(UInt32Array::from(embedded.iter().map(|c| c.position).collect::<Vec<_>>())),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
            ],
        )?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let table = self.conn.open_table(&self.table_name).execute().await?;
        table.delete(&replaced_rows_predicate(&embedded)).await?;
        table.add(reader).execute().await?;
        info!(chunks = embedded.len(), table = %self.table_name, "lance: indexed chunks");
        Ok(embedded.len())
    }

    pub async fn count(&self) -> anyhow::Result<usize> {
        let table = self.conn.open_table(&self.table_name).execute().await?;
        Ok(table.count_rows(None).await?)
    }

    async fn knn(&self, doc_id: &str, vector: &[f32], k: usize) -> anyhow::Result<Vec<IndexHit>> {
        let table = self.conn.open_table(&self.table_name).execute().await?;
        if table.count_rows(None).await? == 0 {
            return Ok(Vec::new());
        }
        let filter = format!("doc_id = {}", sql_string(doc_id));
        let mut stream = table
            .vector_search(vector.to_vec())?
            .distance_type(DistanceType::Cosine)
            .only_if(filter)
            .limit(k)
            .execute()
            .await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            hits.extend(batch_to_hits(&batch)?);
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id)));
        hits.truncate(k);
        Ok(hits)
    }
}

fn sql_string(value: &str) -> String { format!("'{}'", value.replace('\'', "''")) }

/// Matches the stored rows for `chunks`, grouped per document.
fn replaced_rows_predicate(chunks: &[&Chunk]) -> String {
    let mut by_doc: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for c in chunks {
        by_doc.entry(c.doc_id.as_str()).or_default().push(sql_string(&c.chunk_id));
    }
    by_doc
        .into_iter()
        .map(|(doc_id, ids)| format!("(doc_id = {} AND chunk_id IN ({}))", sql_string(doc_id), ids.join(", ")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("lance result is missing column '{name}'"))
}

fn batch_to_hits(batch: &RecordBatch) -> anyhow::Result<Vec<IndexHit>> {
    let chunk_id = string_col(batch, "chunk_id")?;
    let doc_id = string_col(batch, "doc_id")?;
    let text = string_col(batch, "text")?;
    let chunk_type = string_col(batch, "chunk_type")?;
    let page = batch.column_by_name("page").and_then(|c| c.as_primitive_opt::<UInt32Type>());
    let position = batch.column_by_name("position").and_then(|c| c.as_primitive_opt::<UInt32Type>());
    let distance = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_primitive_opt::<Float32Type>())
        .ok_or_else(|| anyhow!("lance result is missing column '_distance'"))?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let chunk = Chunk {
            chunk_id: chunk_id.value(i).to_string(),
            doc_id: doc_id.value(i).to_string(),
            text: text.value(i).to_string(),
            chunk_type: ChunkType::parse(chunk_type.value(i)).unwrap_or_default(),
            page: page.filter(|p| p.is_valid(i)).map(|p| p.value(i)),
            position: position.map_or(0, |p| p.value(i)),
            embedding: None,
        };
        let score = (1.0 - distance.value(i)).clamp(0.0, 1.0);
        hits.push(IndexHit { chunk: Arc::new(chunk), score });
    }
    Ok(hits)
}

#[async_trait]
impl SemanticIndex for LanceChunkIndex {
    async fn search_semantic(&self, doc_id: &str, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if vector.len() != self.dim {
            return Err(Error::embedding(format!("query vector has dim {}, index expects {}", vector.len(), self.dim)));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let hits = self.knn(doc_id, vector, k).await.map_err(|e| Error::index_unavailable(format!("lancedb: {e:#}")))?;
        debug!(doc_id, hits = hits.len(), "lance: semantic search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_becomes_clamped_similarity() {
        let schema = Arc::new(arrow_schema::Schema::new(vec![
            arrow_schema::Field::new("chunk_id", arrow_schema::DataType::Utf8, false),
            arrow_schema::Field::new("doc_id", arrow_schema::DataType::Utf8, false),
            arrow_schema::Field::new("text", arrow_schema::DataType::Utf8, false),
            arrow_schema::Field::new("chunk_type", arrow_schema::DataType::Utf8, false),
            arrow_schema::Field::new("page", arrow_schema::DataType::UInt32, true),
            arrow_schema::Field::new("position", arrow_schema::DataType::UInt32, false),
            arrow_schema::Field::new("_distance", arrow_schema::DataType::Float32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(StringArray::from(vec!["d", "d"])),
                Arc::new(StringArray::from(vec!["total", ""])),
                Arc::new(StringArray::from(vec!["text", "image"])),
                Arc::new(UInt32Array::from(vec![Some(2), None])),
                Arc::new(UInt32Array::from(vec![4, 0])),
                Arc::new(arrow_array::Float32Array::from(vec![0.25, 1.6])),
            ],
        )
        .expect("batch");
        let hits = batch_to_hits(&batch).expect("hits");
        assert!((hits[0].score - 0.75).abs() < 1e-6);
        assert_eq!(hits[0].chunk.page, Some(2));
        assert_eq!(hits[0].chunk.position, 4);
        assert_eq!(hits[1].score, 0.0);
        assert!(hits[1].chunk.is_image());
        assert_eq!(hits[1].chunk.page, None);
    }

    #[test]
    fn replaced_rows_are_scoped_per_document() {
        let a = Chunk::text("doc-a", "p0-1", Some(0), 1, "x");
        let b = Chunk::text("doc-b", "p0-1", Some(0), 1, "y");
        let c = Chunk::text("doc-a", "o'neil", Some(0), 2, "z");
        let predicate = replaced_rows_predicate(&[&a, &b, &c]);
        assert_eq!(
            predicate,
            "(doc_id = 'doc-a' AND chunk_id IN ('p0-1', 'o''neil')) OR (doc_id = 'doc-b' AND chunk_id IN ('p0-1'))"
        );
    }
}
