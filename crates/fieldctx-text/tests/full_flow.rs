use fieldctx_core::traits::{ChunkStore, LexicalIndex};
use fieldctx_core::Chunk;
use fieldctx_text::TantivyChunkIndex;

fn chunks() -> Vec<Chunk> {
    vec![
        Chunk::text("inv-1", "inv-1-0", Some(0), 0, "ACME Corporation invoice 4711"),
        Chunk::text("inv-1", "inv-1-1", Some(0), 1, "Total amount due: 120.00 EUR"),
        Chunk::text("inv-1", "inv-1-2", Some(0), 2, "Payment within thirty days"),
        Chunk::image("inv-1", "inv-1-3", Some(0), 3),
        Chunk::text("inv-1", "inv-1-4", Some(1), 0, "Thank you for your business"),
        Chunk::text("inv-2", "inv-2-0", Some(0), 0, "Total amount due: 999.00 EUR"),
    ]
}

#[tokio::test]
async fn tantivy_full_flow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index_dir = dir.path().join("tantivy");
    let index = TantivyChunkIndex::create(&index_dir).expect("create");
    assert_eq!(index.add_chunks(&chunks()).expect("index"), 6);
    assert_eq!(index.num_chunks(), 6);

    let hits = index.search_lexical("inv-1", "total amount due", 10).await.expect("search");
    assert_eq!(hits.first().map(|h| h.chunk.chunk_id.as_str()), Some("inv-1-1"));
    assert!(hits.iter().all(|h| h.chunk.doc_id == "inv-1"));
    assert!(hits[0].score > 0.0);

    // reopen from disk
    drop(index);
    let index = TantivyChunkIndex::open(&index_dir).expect("open");
    let typo = index.search_lexical("inv-1", "invoise", 10).await.expect("search");
    assert_eq!(typo.first().map(|h| h.chunk.chunk_id.as_str()), Some("inv-1-0"));

    let stop_words_only = index.search_lexical("inv-1", "the of and", 10).await.expect("search");
    assert!(stop_words_only.is_empty());
    assert!(index.search_lexical("missing-doc", "total", 10).await.expect("search").is_empty());
    assert!(index.search_lexical("inv-1", "total", 0).await.expect("search").is_empty());
}

#[tokio::test]
async fn position_range_lookup_stays_on_page() {
    let index = TantivyChunkIndex::in_ram().expect("index");
    index.add_chunks(&chunks()).expect("index");

    let around = index.fetch_by_position_range("inv-1", 0, 1..=3).await.expect("fetch");
    let ids: Vec<&str> = around.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["inv-1-1", "inv-1-2", "inv-1-3"]);
    assert!(around[2].is_image());
    assert_eq!(around[0].page, Some(0));

    let next_page = index.fetch_by_position_range("inv-1", 1, 0..=5).await.expect("fetch");
    assert_eq!(next_page.len(), 1);
    assert!(index.fetch_by_position_range("inv-2", 0, 1..=4).await.expect("fetch").is_empty());
}

#[tokio::test]
async fn reindexing_a_chunk_replaces_it() {
    let index = TantivyChunkIndex::in_ram().expect("index");
    index.add_chunks(&chunks()).expect("index");
    index
        .add_chunks(&[Chunk::text("inv-1", "inv-1-2", Some(0), 2, "Payment due on receipt")])
        .expect("reindex");
    assert_eq!(index.num_chunks(), 6);

    let hits = index.search_lexical("inv-1", "receipt", 5).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text, "Payment due on receipt");
}

#[tokio::test]
async fn same_chunk_id_in_two_documents_is_kept_apart() {
    let index = TantivyChunkIndex::in_ram().expect("index");
    index.add_chunks(&[Chunk::text("doc-a", "p0-1", Some(0), 1, "Total amount due: 10.00")]).expect("doc-a");
    index.add_chunks(&[Chunk::text("doc-b", "p0-1", Some(0), 1, "Total amount due: 20.00")]).expect("doc-b");
    assert_eq!(index.num_chunks(), 2);

    let a = index.search_lexical("doc-a", "total", 5).await.expect("search");
    assert_eq!(a.len(), 1);
    assert!(a[0].chunk.text.contains("10.00"));
    let b = index.search_lexical("doc-b", "total", 5).await.expect("search");
    assert_eq!(b.len(), 1);
    assert!(b[0].chunk.text.contains("20.00"));
}
