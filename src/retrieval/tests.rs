use super::*;
use crate::embeddings::testing::{HashEmbedder, TEST_DIMENSION, ZeroEmbedder};
use crate::embeddings::{ChunkingConfig, zero_vector};
use tempfile::TempDir;

const DIM: usize = TEST_DIMENSION;

/// Breaks the one-vector-per-input contract
struct DroppingEmbedder;

impl Embedder for DroppingEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().skip(1).map(|_| zero_vector(DIM)).collect()
    }

    fn embed_one(&self, _text: &str) -> Vec<f32> {
        zero_vector(DIM)
    }
}

async fn create_bridge<E: Embedder>(
    embedder: E,
    chunking: ChunkingConfig,
    config: RetrievalConfig,
) -> (RetrievalBridge<E>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let index = VectorIndex::open(temp_dir.path().join("vectors"))
        .await
        .expect("should open vector index");
    let chunker = TextChunker::new(&chunking).expect("should build chunker");
    (RetrievalBridge::new(embedder, index, chunker, config), temp_dir)
}

fn small_chunks() -> ChunkingConfig {
    ChunkingConfig {
        chunk_size: 20,
        chunk_overlap: 5,
    }
}

const MANUAL: &str = "Replace the fuse. Check voltage. Restart the motor.";

#[test]
fn retrieval_config_defaults() {
    let config = RetrievalConfig::default();
    assert_eq!(config.top_k, 3);
    assert_eq!(config.collection_name, "knowledge_base");
    assert_eq!(config.max_document_chars, 200_000);
}

#[test]
fn truncation_respects_char_boundaries() {
    assert_eq!(truncate_chars("伺服电机报警", 2), ("伺服", true));
    assert_eq!(truncate_chars("abc", 3), ("abc", false));
    assert_eq!(truncate_chars("abc", 10), ("abc", false));
}

#[tokio::test]
async fn blank_document_is_rejected() {
    let (bridge, _temp_dir) =
        create_bridge(HashEmbedder, small_chunks(), RetrievalConfig::default()).await;

    let err = bridge
        .ingest("   \n\t ")
        .await
        .expect_err("blank document should fail");
    assert!(matches!(err, KnowledgeError::EmptyDocument));
    assert!(!bridge.is_ready().await);
}

#[tokio::test]
async fn retrieve_before_ingest_is_empty() {
    let (bridge, _temp_dir) =
        create_bridge(HashEmbedder, small_chunks(), RetrievalConfig::default()).await;

    assert_eq!(bridge.retrieve("fuse", 3).await, "");
    assert!(!bridge.is_ready().await);
}

#[tokio::test]
async fn blank_question_is_empty() {
    let (bridge, _temp_dir) =
        create_bridge(HashEmbedder, small_chunks(), RetrievalConfig::default()).await;
    bridge.ingest(MANUAL).await.expect("should ingest manual");

    assert_eq!(bridge.retrieve("", 3).await, "");
    assert_eq!(bridge.retrieve("   ", 3).await, "");
}

#[tokio::test]
async fn ingest_then_retrieve_finds_keyword() {
    let (bridge, _temp_dir) =
        create_bridge(HashEmbedder, small_chunks(), RetrievalConfig::default()).await;

    let report = bridge.ingest(MANUAL).await.expect("should ingest manual");
    assert!(report.chunk_count >= 2);
    assert_eq!(report.degraded_vectors, 0);
    assert!(!report.truncated);
    assert!(bridge.is_ready().await);

    let context = bridge.retrieve("fuse", 1).await;
    assert!(context.contains("fuse"), "context was {:?}", context);
}

#[tokio::test]
async fn exact_chunk_query_ranks_first() {
    let (bridge, _temp_dir) =
        create_bridge(HashEmbedder, small_chunks(), RetrievalConfig::default()).await;
    bridge.ingest(MANUAL).await.expect("should ingest manual");

    for chunk in bridge.chunker.split_text(MANUAL) {
        let hits = bridge.search(&chunk, 3).await.expect("should search");
        assert_eq!(hits[0], chunk);
    }
}

#[tokio::test]
async fn context_joins_chunks_with_separator() {
    let (bridge, _temp_dir) =
        create_bridge(HashEmbedder, small_chunks(), RetrievalConfig::default()).await;
    let report = bridge.ingest(MANUAL).await.expect("should ingest manual");

    let context = bridge.retrieve("motor", report.chunk_count).await;
    assert_eq!(
        context.split(CONTEXT_SEPARATOR).count(),
        report.chunk_count
    );
}

#[tokio::test]
async fn reingest_is_idempotent() {
    let (bridge, _temp_dir) =
        create_bridge(HashEmbedder, small_chunks(), RetrievalConfig::default()).await;

    let first = bridge.ingest(MANUAL).await.expect("first ingest");
    let first_hits = bridge.search("voltage", 10).await.expect("should search");
    let second = bridge.ingest(MANUAL).await.expect("second ingest");
    let second_hits = bridge.search("voltage", 10).await.expect("should search");

    assert_eq!(first, second);
    assert_eq!(first_hits, second_hits);
    assert_eq!(
        bridge
            .index()
            .count(&bridge.config().collection_name)
            .await
            .expect("should count"),
        first.chunk_count
    );
}

#[tokio::test]
async fn reingest_discards_previous_document() {
    let (bridge, _temp_dir) =
        create_bridge(HashEmbedder, small_chunks(), RetrievalConfig::default()).await;

    bridge.ingest(MANUAL).await.expect("first ingest");
    bridge
        .ingest("Encoder cable loose. Reseat connector.")
        .await
        .expect("second ingest");

    let context = bridge.retrieve("fuse", 10).await;
    assert!(!context.contains("fuse"));
    assert!(context.contains("Encoder"));
}

#[tokio::test]
async fn provider_outage_degrades_to_zero_vectors() {
    let (bridge, _temp_dir) =
        create_bridge(ZeroEmbedder, small_chunks(), RetrievalConfig::default()).await;

    let report = bridge.ingest(MANUAL).await.expect("degraded ingest should succeed");
    assert_eq!(report.degraded_vectors, report.chunk_count);
    assert!(report.is_degraded());

    let context = bridge.retrieve("fuse", 2).await;
    assert_eq!(context.split(CONTEXT_SEPARATOR).count(), 2);
}

#[tokio::test]
async fn broken_embedder_contract_fails_at_embedding_stage() {
    let (bridge, _temp_dir) =
        create_bridge(DroppingEmbedder, small_chunks(), RetrievalConfig::default()).await;

    let err = bridge.ingest(MANUAL).await.expect_err("ingest should fail");
    assert_eq!(err.stage(), Some(IngestStage::Embedding));
    assert!(matches!(err.root(), KnowledgeError::ProviderFailure { .. }));
    assert!(!bridge.is_ready().await);
}

#[tokio::test]
async fn invalid_collection_fails_at_indexing_stage() {
    let config = RetrievalConfig {
        collection_name: "not valid".to_string(),
        ..RetrievalConfig::default()
    };
    let (bridge, _temp_dir) = create_bridge(HashEmbedder, small_chunks(), config).await;

    let err = bridge.ingest(MANUAL).await.expect_err("ingest should fail");
    assert_eq!(err.stage(), Some(IngestStage::Indexing));
    assert!(err.user_message().contains("indexing"));

    // Retrieval still degrades instead of failing
    assert_eq!(bridge.retrieve("fuse", 3).await, "");
}

#[tokio::test]
async fn long_documents_are_truncated() {
    let config = RetrievalConfig {
        max_document_chars: 17,
        ..RetrievalConfig::default()
    };
    let (bridge, _temp_dir) = create_bridge(HashEmbedder, small_chunks(), config).await;

    let report = bridge.ingest(MANUAL).await.expect("should ingest");
    assert!(report.truncated);
    assert_eq!(report.chunk_count, 1);
    assert_eq!(bridge.retrieve("fuse", 3).await, "Replace the fuse.");
}

#[test]
fn report_display_mentions_degradation() {
    let report = IngestReport {
        collection: "knowledge_base".to_string(),
        chunk_count: 4,
        degraded_vectors: 1,
        truncated: true,
    };
    let text = report.to_string();
    assert!(text.contains("4 chunks"));
    assert!(text.contains("truncated"));
    assert!(text.contains("1 chunks could not be embedded"));
}
