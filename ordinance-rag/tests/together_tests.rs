//! Together embeddings client against a mocked endpoint.
#![cfg(feature = "together")]

use ordinance_rag::together::TogetherEmbeddingProvider;
use ordinance_rag::{BatchingEmbedder, EmbeddingProvider, RagError};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> TogetherEmbeddingProvider {
    TogetherEmbeddingProvider::new("secret")
        .unwrap()
        .with_base_url(server.uri())
        .with_dimensions(3)
}

#[tokio::test]
async fn batch_results_follow_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0, 0.0]},
                {"index": 0, "embedding": [1.0, 0.0, 0.0]}
            ]
        })))
        .mount(&server)
        .await;

    let embeddings = provider(&server).embed_batch(&["fire", "parking"]).await.unwrap();
    assert_eq!(embeddings, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn wrong_dimensions_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0]}]
        })))
        .mount(&server)
        .await;

    let err = provider(&server).embed("fire").await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }));
}

#[tokio::test]
async fn rate_limited_batches_fall_back_to_zero_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "rate limited"}})),
        )
        .mount(&server)
        .await;

    let embedder = BatchingEmbedder::with_batch_size(provider(&server), 2);
    let embeddings = embedder.embed_batch(&["a", "b", "c"]).await.unwrap();

    assert_eq!(embeddings, vec![vec![0.0; 3]; 3]);
    let stats = embedder.stats();
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.fallback_batches, 2);
    assert_eq!(stats.fallback_texts, 3);

    let err = embedder.embed("a").await.unwrap_err();
    assert!(err.to_string().contains("rate limited"));
}

#[test]
fn empty_api_key_is_rejected() {
    assert!(TogetherEmbeddingProvider::new("").is_err());
}
