//! Integration tests for the Ollama adapters against a mock HTTP server
//!
//! Covers NDJSON streaming generation, batch embeddings, model listing and
//! the error mapping for missing models and unreachable servers, then drives
//! a full conversation turn through the engine over the mock server.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{create_store, rag_config, WordEmbedder};
use ragpersona::commands::open_store;
use ragpersona::config::{Config, OllamaConfig};
use ragpersona::conversation::{ChatHistory, TurnStatus};
use ragpersona::engine::ConversationEngine;
use ragpersona::error::RagPersonaError;
use ragpersona::providers::{
    Embedder, GenerationEvent, GenerationOptions, GenerationRequest, OllamaEmbedder,
    OllamaProvider, Provider,
};

fn config_for(server: &MockServer) -> OllamaConfig {
    OllamaConfig {
        host: server.uri(),
        request_timeout_seconds: 5,
        ..OllamaConfig::default()
    }
}

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest {
        model: "llama3.2".to_string(),
        prompt: prompt.to_string(),
        options: GenerationOptions::default(),
    }
}

fn ndjson(lines: &[serde_json::Value]) -> String {
    lines
        .iter()
        .map(|l| format!("{}\n", l))
        .collect::<Vec<_>>()
        .join("")
}

fn kind(err: &anyhow::Error) -> Option<&RagPersonaError> {
    err.downcast_ref::<RagPersonaError>()
}

#[tokio::test]
async fn test_generate_streams_fragments_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llama3.2", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"response": "Wubba ", "done": false}),
            json!({"response": "lubba dub dub", "done": false}),
            json!({"response": "", "done": true, "prompt_eval_count": 20, "eval_count": 4}),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&config_for(&server)).expect("provider");
    let events: Vec<GenerationEvent> = provider
        .generate(&request("Say it"))
        .await
        .expect("dispatch")
        .map(|e| e.expect("event"))
        .collect()
        .await;

    assert_eq!(events.len(), 3);
    assert_eq!(events[0], GenerationEvent::Fragment("Wubba ".to_string()));
    assert_eq!(
        events[1],
        GenerationEvent::Fragment("lubba dub dub".to_string())
    );
    match &events[2] {
        GenerationEvent::Done { usage: Some(usage) } => {
            assert_eq!(usage.prompt_tokens, 20);
            assert_eq!(usage.completion_tokens, 4);
        }
        other => panic!("expected Done with usage, got {:?}", other),
    }
}

#[tokio::test]
async fn test_generate_without_done_line_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ndjson(&[json!({"response": "I'm Pickle", "done": false})])),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&config_for(&server)).expect("provider");
    let events: Vec<_> = provider
        .generate(&request("Say it"))
        .await
        .expect("dispatch")
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert!(!events
        .iter()
        .any(|e| matches!(e, Ok(GenerationEvent::Done { .. }))));
}

#[tokio::test]
async fn test_generate_unknown_model_maps_to_model_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'llama9' not found"})),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&config_for(&server)).expect("provider");
    let err = match provider.generate(&request("hi")).await {
        Ok(_) => panic!("expected dispatch to fail"),
        Err(e) => e,
    };
    assert!(matches!(kind(&err), Some(RagPersonaError::ModelNotFound(_))));
}

#[tokio::test]
async fn test_generate_server_error_maps_to_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&config_for(&server)).expect("provider");
    let err = match provider.generate(&request("hi")).await {
        Ok(_) => panic!("expected dispatch to fail"),
        Err(e) => e,
    };
    assert!(matches!(
        kind(&err),
        Some(RagPersonaError::InferenceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_unreachable_server_is_unavailable() {
    let config = OllamaConfig {
        host: "http://127.0.0.1:1".to_string(),
        request_timeout_seconds: 2,
        ..OllamaConfig::default()
    };
    let provider = OllamaProvider::new(&config).expect("provider");

    let err = provider.health_check().await.unwrap_err();
    assert!(matches!(
        kind(&err),
        Some(RagPersonaError::InferenceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_embed_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "all-minilm", "input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "all-minilm",
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&config_for(&server)).expect("embedder");
    let vectors = embedder
        .embed(&["a".to_string(), "b".to_string()])
        .await
        .expect("embed");

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
}

#[tokio::test]
async fn test_embed_rejects_missing_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.2]]})),
        )
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&config_for(&server)).expect("embedder");
    let err = embedder
        .embed(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        kind(&err),
        Some(RagPersonaError::InferenceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_list_models_and_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3.2:latest", "size": 2019393189u64, "digest": "abc", "modified_at": "2024-10-01T12:00:00Z"},
                {"name": "all-minilm:latest", "size": 45960996u64}
            ]
        })))
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&config_for(&server)).expect("provider");
    provider.health_check().await.expect("healthy");

    let models = provider.list_models().await.expect("models");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "llama3.2:latest");
    assert_eq!(models[0].size, "1.9GB");
    assert_eq!(
        models[0].provider_specific.get("digest").map(String::as_str),
        Some("abc")
    );
    assert_eq!(models[1].size, "43.8MB");
}

#[tokio::test]
async fn test_conversation_turn_over_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"response": "The name's ", "done": false}),
            json!({"response": "Rick.", "done": false}),
            json!({"response": "", "done": true}),
        ])))
        .mount(&server)
        .await;

    let (store, _tmp) = create_store(Arc::new(WordEmbedder::new()), rag_config(60, 10));
    store.create("Rick", "Mad scientist").expect("create persona");
    store
        .add_source(
            "Rick",
            "My name is Rick Sanchez. I built a portal gun.",
            "clip1",
            "clip1.srt",
        )
        .await
        .expect("ingest");
    let store = Arc::new(store);

    let mut config = Config::default();
    config.ollama = config_for(&server);
    let provider: Arc<dyn Provider> =
        Arc::new(OllamaProvider::new(&config.ollama).expect("provider"));
    let engine = ConversationEngine::new(provider, Arc::clone(&store), &config);

    let persona = store.get("Rick").expect("get persona");
    let mut history = ChatHistory::new();
    let mut streamed = String::new();
    let reply = engine
        .respond(
            &persona,
            "what is your name",
            &mut history,
            &CancellationToken::new(),
            |fragment| streamed.push_str(fragment),
        )
        .await
        .expect("reply");

    assert_eq!(reply.text, "The name's Rick.");
    assert_eq!(streamed, reply.text);
    assert_eq!(reply.status, TurnStatus::Complete);
    assert!(reply.context.iter().all(|c| c.source_label == "clip1"));
    assert_eq!(history.len(), 2);

    let received = server.received_requests().await.expect("recorded requests");
    let body: serde_json::Value =
        serde_json::from_slice(&received[0].body).expect("request body is JSON");
    let prompt = body["prompt"].as_str().expect("prompt string");
    assert!(prompt.contains("You are Rick."));
    assert!(prompt.contains("[Source: clip1]"));
    assert!(prompt.contains("User: what is your name"));
}

#[tokio::test]
async fn test_persona_keeps_embedding_model_after_config_change() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "all-minilm"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.6, 0.8, 0.0]]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "nomic-embed-text"})))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "model 'nomic-embed-text' not found"
        })))
        .mount(&server)
        .await;

    let tmp = tempfile::TempDir::new().expect("tempdir");
    let mut config = Config::default();
    config.ollama = config_for(&server);
    config.ollama.embedding_model = "all-minilm".to_string();
    config.storage.data_dir = Some(tmp.path().to_path_buf());

    let store = open_store(&config).expect("open store");
    store.create("Rick", "").expect("create persona");
    store
        .add_source("Rick", "Wubba lubba dub dub.", "clip1", "clip1.srt")
        .await
        .expect("ingest");
    drop(store);

    config.ollama.embedding_model = "nomic-embed-text".to_string();
    let store = open_store(&config).expect("reopen store");
    assert_eq!(store.get("Rick").expect("persona").embedding_model, "all-minilm");

    let results = store
        .index()
        .query_top_k("rick", "catchphrase", 1)
        .await
        .expect("retrieve with the persona's model");
    assert_eq!(results.len(), 1);
    assert!(results[0].chunk.text.contains("Wubba"));

    store.create("Morty", "").expect("create second persona");
    assert_eq!(
        store.get("Morty").expect("persona").embedding_model,
        "nomic-embed-text"
    );
}
