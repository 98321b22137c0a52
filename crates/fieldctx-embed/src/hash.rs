use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use fieldctx_core::memory::tokenize;
use fieldctx_core::traits::EmbeddingProvider;
use fieldctx_core::Result;

/// Deterministic bag-of-tokens embedder for tests and model-free setups.
///
/// Each token is hashed into one of `dim` buckets; the vector is L2-normalised.
/// Texts sharing tokens get positive cosine similarity. Text without tokens
/// embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokenize(text) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            // upper 24 bits give a per-token weight in [0.5, 1.0)
            v[idx] += 0.5 + (h >> 40) as f32 / 33_554_432.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> { Ok(self.embed_sync(text)) }
}
