//! HTTP-level tests for the OpenAI adapter.
//!
//! A wiremock server stands in for the API so request shape, auth headers,
//! normalization and status classification can be checked end to end.

use agora_core::{Content, NormalizedResult, OperationKind};
use agora_inference::openai::{OpenAIConfig, OpenAIProvider};
use agora_inference::{ExecuteOptions, Provider, ProviderError};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> OpenAIProvider {
    OpenAIProvider::new(OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        timeout_seconds: 5,
        organization: None,
    })
    .expect("Failed to create provider")
}

fn chat_reply(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o-mini-2024-07-18",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
    })
}

#[tokio::test]
async fn test_tag_sends_bearer_auth_and_normalizes_tags() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            r##"{"tags": ["#Robotics", "robotics", "Clubs", "Engineering"], "confidence": 0.87}"##,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server);
    let options = ExecuteOptions {
        max_tags: 2,
        ..Default::default()
    };
    let output = provider
        .execute(
            OperationKind::Tag,
            &Content::text("Robotics club meets Thursday"),
            "gpt-4o-mini",
            &options,
        )
        .await
        .expect("tag call should succeed");

    match output.result {
        NormalizedResult::Tags { tags, confidence } => {
            assert_eq!(tags, vec!["robotics", "clubs"]);
            assert!((confidence - 0.87).abs() < 1e-9);
        }
        other => panic!("expected tags, got {:?}", other),
    }
    assert_eq!(output.model, "gpt-4o-mini-2024-07-18");
    let usage = output.usage.expect("usage reported");
    assert_eq!(usage.input_tokens, 42);
    assert_eq!(usage.output_tokens, 7);
}

#[tokio::test]
async fn test_moderation_applies_threshold() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/moderations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "modr-1",
            "model": "omni-moderation-latest",
            "results": [{
                "flagged": false,
                "categories": {"harassment": false, "violence": false},
                "category_scores": {"harassment": 0.31, "violence": 0.02}
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server);
    let options = ExecuteOptions {
        moderation_threshold: 0.3,
        ..Default::default()
    };
    let output = provider
        .execute(
            OperationKind::Moderate,
            &Content::text("you are all terrible"),
            "omni-moderation-latest",
            &options,
        )
        .await
        .unwrap();

    match output.result {
        NormalizedResult::Moderation {
            flagged,
            categories,
            scores,
            ..
        } => {
            assert!(flagged, "score over threshold must flag");
            assert!(categories.contains("harassment"));
            assert_eq!(scores.len(), 2);
        }
        other => panic!("expected moderation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_embed_returns_vector() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_partial_json(serde_json::json!({"encoding_format": "float"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3, 0.4], "index": 0}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 3, "total_tokens": 3}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server);
    let output = provider
        .execute(
            OperationKind::Embed,
            &Content::text("vector me"),
            "text-embedding-3-small",
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

    match output.result {
        NormalizedResult::Embedding { vector, dimensions } => {
            assert_eq!(dimensions, 4);
            assert_eq!(vector.len(), 4);
        }
        other => panic!("expected embedding, got {:?}", other),
    }
    assert_eq!(output.usage.unwrap().input_tokens, 3);
}

#[tokio::test]
async fn test_rate_limit_is_transient_with_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "5")
                .set_body_json(serde_json::json!({
                    "error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}
                })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server);
    let err = provider
        .execute(
            OperationKind::Chat,
            &Content::text("hello"),
            "gpt-4o-mini",
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.retry_after_secs(), Some(5));
}

#[tokio::test]
async fn test_auth_failure_is_permanent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Incorrect API key", "type": "invalid_request_error", "code": "invalid_api_key"}
        })))
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server);
    let err = provider
        .execute(
            OperationKind::Summarize,
            &Content::text("hello"),
            "gpt-4o-mini",
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();

    match err {
        ProviderError::Permanent { status, message } => {
            assert_eq!(status, Some(401));
            assert!(message.contains("Authentication failed"));
        }
        other => panic!("expected permanent, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_permanent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let provider = provider_for(&mock_server);
    let err = provider
        .execute(
            OperationKind::Chat,
            &Content::text("hello"),
            "gpt-4o-mini",
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_health_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&mock_server)
        .await;

    assert!(provider_for(&mock_server).health_check().await);

    let down = OpenAIProvider::new(OpenAIConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert!(!down.health_check().await);
}
