use super::*;
use crate::documents::{Document, DocumentMetadata};
use crate::embeddings::{ChunkingConfig, HashEmbedder};
use crate::indexer::IndexOptions;
use tempfile::TempDir;

const DIMENSION: usize = 64;

async fn engine_with(dir: &TempDir, embedder: HashEmbedder) -> (Arc<IndexManager>, QueryEngine) {
    let client = EmbeddingClient::new(Arc::new(embedder));
    let manager = IndexManager::open(
        dir.path().join("index.jsonl"),
        IndexOptions {
            collection: "query-test".to_string(),
            dimension: DIMENSION,
            chunking: ChunkingConfig::default(),
            batch_size: 4,
            concurrency: 2,
        },
        client.clone(),
    )
    .await
    .expect("manager should open");
    let manager = Arc::new(manager);
    let engine = QueryEngine::new(Arc::clone(&manager), client);
    (manager, engine)
}

fn corpus() -> Vec<Document> {
    [
        ("doc1", "Meeting notes: discuss roadmap"),
        ("doc2", "Grocery list: milk, eggs"),
        ("doc3", "Travel plans for the summer"),
    ]
    .into_iter()
    .map(|(id, text)| {
        Document::new(id, text, DocumentMetadata::default()).expect("document should be valid")
    })
    .collect()
}

#[tokio::test]
async fn answers_before_build_are_not_ready() {
    let dir = TempDir::new().expect("should create temp dir");
    let (_, engine) = engine_with(&dir, HashEmbedder::new(DIMENSION)).await;

    let result = engine.answer("roadmap discussion", None).await;
    assert!(matches!(result, Err(MemoryError::IndexNotReady(_))));
}

#[tokio::test]
async fn relevant_passage_ranks_first() {
    let dir = TempDir::new().expect("should create temp dir");
    let (manager, engine) = engine_with(&dir, HashEmbedder::new(DIMENSION)).await;
    manager
        .rebuild_from(&corpus())
        .await
        .expect("rebuild should succeed");

    let answers = engine
        .answer("roadmap discussion", Some(2))
        .await
        .expect("query should succeed");

    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].metadata.source_id, "doc1");
    assert_eq!(answers[0].text, "Meeting notes: discuss roadmap");
    assert!(answers[0].score > answers[1].score);
}

#[tokio::test]
async fn k_defaults_and_bounds() {
    let dir = TempDir::new().expect("should create temp dir");
    let (manager, engine) = engine_with(&dir, HashEmbedder::new(DIMENSION)).await;
    manager
        .rebuild_from(&corpus())
        .await
        .expect("rebuild should succeed");

    let all = engine
        .answer("notes", None)
        .await
        .expect("query should succeed");
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].score >= w[1].score));

    let engine = engine.with_default_k(1);
    let one = engine
        .answer("notes", None)
        .await
        .expect("query should succeed");
    assert_eq!(one.len(), 1);
}

#[tokio::test]
async fn rejects_invalid_queries() {
    let dir = TempDir::new().expect("should create temp dir");
    let (manager, engine) = engine_with(&dir, HashEmbedder::new(DIMENSION)).await;
    manager
        .rebuild_from(&corpus())
        .await
        .expect("rebuild should succeed");

    assert!(matches!(
        engine.answer("   ", None).await,
        Err(MemoryError::InvalidQuery(_))
    ));
    assert!(matches!(
        engine.answer("roadmap", Some(0)).await,
        Err(MemoryError::InvalidQuery(_))
    ));
}

#[tokio::test]
async fn provider_outage_propagates() {
    let dir = TempDir::new().expect("should create temp dir");
    let (manager, engine) =
        engine_with(&dir, HashEmbedder::new(DIMENSION).failing_on("outage")).await;
    manager
        .rebuild_from(&corpus())
        .await
        .expect("rebuild should succeed");

    let result = engine.answer("simulated outage", None).await;
    assert!(matches!(result, Err(MemoryError::EmbeddingUnavailable(_))));
}

#[tokio::test]
async fn query_vector_of_wrong_dimension_is_rejected() {
    let dir = TempDir::new().expect("should create temp dir");
    let (manager, engine) =
        engine_with(&dir, HashEmbedder::new(DIMENSION).wrong_dimension_on("skewed")).await;
    manager
        .rebuild_from(&corpus())
        .await
        .expect("rebuild should succeed");

    let result = engine.answer("skewed question", None).await;
    assert!(matches!(
        result,
        Err(MemoryError::EmbeddingDimensionMismatch { .. })
    ));
}

#[tokio::test]
async fn non_finite_query_vector_is_rejected() {
    let dir = TempDir::new().expect("should create temp dir");
    let (manager, engine) =
        engine_with(&dir, HashEmbedder::new(DIMENSION).non_finite_on("poison")).await;
    manager
        .rebuild_from(&corpus())
        .await
        .expect("rebuild should succeed");

    let result = engine.answer("poison roadmap", Some(3)).await;
    assert!(matches!(result, Err(MemoryError::EmbeddingUnavailable(_))));

    let answers = engine
        .answer("roadmap discussion", Some(1))
        .await
        .expect("clean query should succeed");
    assert_eq!(answers[0].metadata.source_id, "doc1");
}
