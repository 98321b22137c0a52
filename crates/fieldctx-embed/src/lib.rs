//! fieldctx-embed
//!
//! Query embedding providers. `CandleEmbedder` runs BGE-M3 locally;
//! `HashEmbedder` is a deterministic stand-in selected by config or by
//! `APP_USE_FAKE_EMBEDDINGS=1`.
pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

use anyhow::{ensure, Result};
use std::sync::Arc;
use tracing::info;

use fieldctx_core::config::{EmbeddingConfig, EmbeddingProviderKind};
use fieldctx_core::traits::EmbeddingProvider;

pub use hash::HashEmbedder;
pub use model::{resolve_model_dir, CandleEmbedder};
pub use pool::masked_mean_l2;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn get_default_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if use_fake_embeddings() || config.provider == EmbeddingProviderKind::Hash {
        info!(dim = config.dim, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(config.dim)));
    }
    let model_dir = resolve_model_dir(config.model_dir.as_deref())?;
    let embedder = CandleEmbedder::load(&model_dir, config.max_len)?;
    ensure!(
        embedder.dim() == config.dim,
        "model at {} has dim {}, config expects {}",
        model_dir.display(),
        embedder.dim(),
        config.dim
    );
    Ok(Arc::new(embedder))
}
