//! fieldctx-vector
//!
//! LanceDB-backed semantic index over pre-embedded chunks. Similarity is
//! `1 - cosine_distance`, clamped to `[0, 1]`.
pub mod index;
pub mod schema;
pub mod table;

pub use index::LanceChunkIndex;
