use fieldctx_core::config::{EmbeddingConfig, EmbeddingProviderKind};
use fieldctx_core::traits::EmbeddingProvider;
use fieldctx_embed::get_default_embedder;

#[tokio::test]
async fn hash_embedder_shapes_and_determinism() {
    let config = EmbeddingConfig { provider: EmbeddingProviderKind::Hash, dim: 1024, ..EmbeddingConfig::default() };
    let embedder = get_default_embedder(&config).expect("embedder");
    assert_eq!(embedder.dim(), 1024);

    let v1 = embedder.embed("hello world").await.expect("embed");
    let v2 = embedder.embed("hello world").await.expect("embed");
    assert_eq!(v1.len(), 1024, "embedding dim is 1024");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn candle_provider_without_model_dir_fails() {
    let config = EmbeddingConfig {
        provider: EmbeddingProviderKind::Candle,
        model_dir: Some("/nonexistent/bge-m3".into()),
        ..EmbeddingConfig::default()
    };
    if fieldctx_embed::use_fake_embeddings() || std::path::Path::new("models/bge-m3").exists() {
        return;
    }
    if std::env::var("APP_MODEL_DIR").is_ok() || std::env::var("MODEL_DIR").is_ok() {
        return;
    }
    assert!(get_default_embedder(&config).is_err());
}
