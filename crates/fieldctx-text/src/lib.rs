//! fieldctx-text
//!
//! Tantivy-backed lexical index and chunk store. One index holds the chunks
//! of many documents; every query is scoped to a single `doc_id`.
pub mod index;
pub mod schema;

pub use index::TantivyChunkIndex;
