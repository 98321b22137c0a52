use fieldctx_core::traits::SemanticIndex;
use fieldctx_core::{Chunk, Error};
use fieldctx_vector::LanceChunkIndex;
use tempfile::TempDir;

fn chunks() -> Vec<Chunk> {
    vec![
        Chunk::text("inv-1", "inv-1-0", Some(0), 0, "ACME Corporation invoice").with_embedding(vec![0.0, 1.0, 0.0, 0.0]),
        Chunk::text("inv-1", "inv-1-1", Some(0), 1, "Total amount due").with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
        Chunk::text("inv-1", "inv-1-2", Some(0), 2, "Payment within thirty days").with_embedding(vec![0.6, 0.8, 0.0, 0.0]),
        Chunk::image("inv-1", "inv-1-3", Some(1), 0).with_embedding(vec![0.0, 0.0, 1.0, 0.0]),
        Chunk::text("inv-1", "inv-1-4", Some(1), 1, "not embedded"),
        Chunk::text("inv-2", "inv-2-0", Some(0), 0, "Total amount due").with_embedding(vec![1.0, 0.0, 0.0, 0.0]),
    ]
}

#[tokio::test]
async fn lancedb_full_flow() {
    let tmp = TempDir::new().expect("tmp");
    let uri = tmp.path().to_string_lossy().to_string();
    let index = LanceChunkIndex::open(&uri, "chunks_test_tmp", 4).await.expect("open");
    assert!(index.search_semantic("inv-1", &[1.0, 0.0, 0.0, 0.0], 3).await.expect("empty table").is_empty());

    assert_eq!(index.add_chunks(&chunks()).await.expect("add"), 5);
    assert_eq!(index.count().await.expect("count"), 5);

    let hits = index.search_semantic("inv-1", &[1.0, 0.0, 0.0, 0.0], 3).await.expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
    assert_eq!(ids[..2], ["inv-1-1", "inv-1-2"]);
    assert!((hits[0].score - 1.0).abs() < 1e-4);
    assert!((hits[1].score - 0.6).abs() < 1e-4);
    assert!(hits.iter().all(|h| h.chunk.doc_id == "inv-1" && (0.0..=1.0).contains(&h.score)));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let image = index.search_semantic("inv-1", &[0.0, 0.0, 1.0, 0.0], 1).await.expect("search");
    assert!(image[0].chunk.is_image());
    assert_eq!(image[0].chunk.page, Some(1));

    // reopen the same table
    let reopened = LanceChunkIndex::open(&uri, "chunks_test_tmp", 4).await.expect("reopen");
    assert_eq!(reopened.count().await.expect("count"), 5);
    let other = reopened.search_semantic("inv-2", &[1.0, 0.0, 0.0, 0.0], 10).await.expect("search");
    assert_eq!(other.len(), 1);
}

#[tokio::test]
async fn reindexing_replaces_rows_instead_of_appending() {
    let tmp = TempDir::new().expect("tmp");
    let index = LanceChunkIndex::open(&tmp.path().to_string_lossy(), "chunks", 4).await.expect("open");
    index.add_chunks(&chunks()).await.expect("first add");
    index.add_chunks(&chunks()).await.expect("second add");
    assert_eq!(index.count().await.expect("count"), 5);

    let hits = index.search_semantic("inv-1", &[1.0, 0.0, 0.0, 0.0], 4).await.expect("search");
    let mut ids: Vec<&str> = hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    let moved = Chunk::text("inv-2", "inv-1-1", Some(0), 1, "same id, other document").with_embedding(vec![1.0, 0.0, 0.0, 0.0]);
    index.add_chunks(&[moved]).await.expect("other document");
    assert_eq!(index.count().await.expect("count"), 6);
}

#[tokio::test]
async fn wrong_query_dimension_is_an_embedding_error() {
    let tmp = TempDir::new().expect("tmp");
    let index = LanceChunkIndex::open(&tmp.path().to_string_lossy(), "chunks", 4).await.expect("open");
    let result = index.search_semantic("inv-1", &[1.0, 0.0], 3).await;
    assert!(matches!(result, Err(Error::Embedding(_))));
}
