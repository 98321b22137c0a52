//! fieldctx-core
//!
//! Shared data model, error taxonomy, collaborator traits and configuration
//! for the field-context retrieval engine.

pub mod catalog;
pub mod config;
pub mod error;
pub mod field_spec;
pub mod memory;
pub mod traits;
pub mod types;

pub use catalog::FieldCatalog;
pub use error::{Error, Result};
pub use field_spec::{FieldSpec, StrategyKind};
pub use types::{Chunk, ChunkType, ScoredChunk};
