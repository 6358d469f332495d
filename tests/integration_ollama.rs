#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! Ingestion and querying against a mock Ollama server
//!
//! The mock answers `/api/embed` with the deterministic hash embedding of each
//! input, so the whole HTTP path is exercised with predictable rankings.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use memory_search::MemoryError;
use memory_search::commands::{ingest, load_documents, query};
use memory_search::config::{Config, OllamaConfig};
use memory_search::embeddings::{EmbeddingClient, HashEmbedder, OllamaClient};
use memory_search::indexer::{IndexManager, IndexOptions};
use memory_search::query::QueryEngine;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DIMENSION: u32 = 64;

struct HashResponder(HashEmbedder);

impl Respond for HashResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };
        let embeddings = body
            .get("input")
            .and_then(Value::as_array)
            .map(|inputs| {
                inputs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|text| self.0.vector_for(text))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

async fn mock_ollama() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(HashResponder(HashEmbedder::new(DIMENSION as usize)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "models": [{ "name": "test-embed" }] })),
        )
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer, dir: &TempDir) -> Config {
    Config {
        ollama: OllamaConfig {
            host: server.address().ip().to_string(),
            port: server.address().port(),
            model: "test-embed".to_string(),
            batch_size: 2,
            embedding_dimension: DIMENSION,
            ..OllamaConfig::default()
        },
        base_dir: dir.path().join("state"),
        ..Config::default()
    }
}

fn write_logs(dir: &TempDir) -> std::path::PathBuf {
    let logs = dir.path().join("logs");
    fs::create_dir_all(&logs).expect("should create logs dir");
    fs::write(logs.join("doc1.txt"), "Meeting notes: discuss roadmap").expect("should write doc1");
    fs::write(logs.join("doc2.txt"), "Grocery list: milk, eggs").expect("should write doc2");
    fs::write(logs.join("doc3.txt"), "Travel plans for the summer").expect("should write doc3");
    logs
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_over_http() {
    init_test_tracing();
    let server = mock_ollama().await;
    let dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, &dir);
    let logs = write_logs(&dir);

    let ollama = OllamaClient::new(&config.ollama).expect("client should build");
    let client = EmbeddingClient::new(Arc::new(ollama)).with_timeout(Duration::from_secs(10));
    let manager = Arc::new(
        IndexManager::open(config.index_path(), IndexOptions::from_config(&config), client.clone())
            .await
            .expect("manager should open"),
    );

    let batch = load_documents(&logs, false).expect("logs should load");
    let report = manager
        .rebuild_from(&batch.documents)
        .await
        .expect("rebuild should succeed");
    assert_eq!(report.records, 3);
    assert!(report.skipped.is_empty());
    assert!(config.index_path().exists());

    let engine = QueryEngine::new(Arc::clone(&manager), client);
    let answers = engine
        .answer("roadmap discussion", Some(2))
        .await
        .expect("query should succeed");

    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].metadata.source_id, "doc1.txt");
    assert!((answers[0].score - 0.3536).abs() < 1e-3);
    assert!(answers[1].score.abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn commands_ingest_then_query() {
    init_test_tracing();
    let server = mock_ollama().await;
    let dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, &dir);
    let logs = write_logs(&dir);

    ingest(&config, &logs, true, false)
        .await
        .expect("ingest command should succeed");
    query(&config, Some("roadmap discussion"), Some(1), true)
        .await
        .expect("query command should succeed");

    let content = fs::read_to_string(config.index_path()).expect("index should exist");
    let header: Value = serde_json::from_str(content.lines().next().unwrap_or_default())
        .expect("header should be JSON");
    assert_eq!(header["name"], "chatgpt-index");
    assert_eq!(header["dimension"], 64);
    assert_eq!(header["record_count"], 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn outage_leaves_no_index_behind() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, &dir);
    let logs = write_logs(&dir);

    let ollama = OllamaClient::new(&config.ollama)
        .expect("client should build")
        .with_retry_attempts(1);
    let client = EmbeddingClient::new(Arc::new(ollama));
    let manager = IndexManager::open(config.index_path(), IndexOptions::from_config(&config), client)
        .await
        .expect("manager should open");

    let batch = load_documents(&logs, false).expect("logs should load");
    let result = manager.rebuild_from(&batch.documents).await;

    assert!(matches!(result, Err(MemoryError::EmbeddingUnavailable(_))));
    assert!(!config.index_path().exists());
    assert!(matches!(
        manager.current().await,
        Err(MemoryError::IndexNotReady(_))
    ));
}
