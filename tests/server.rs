//! HTTP API tests against an in-process server on an ephemeral port.

mod common;

use std::sync::Arc;

use common::*;
use decision_twin::config::ChunkingConfig;
use decision_twin::ingest::ingest_documents;
use decision_twin::server::{router, AppState};
use decision_twin_core::answer::Orchestrator;
use decision_twin_core::generation::TextGenerator;
use decision_twin_core::retrieve::Retriever;
use decision_twin_core::spec::DecisionTwinSpec;
use decision_twin_core::store::memory::InMemoryStore;
use serde_json::{json, Value};

async fn start(generator: Arc<dyn TextGenerator>, ingest: bool) -> String {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(TopicEmbedder::new());
    if ingest {
        ingest_documents(
            &corpus(),
            &ChunkingConfig::default(),
            &adapter(provider.clone()),
            store.as_ref(),
            false,
        )
        .await
        .unwrap();
    }
    let retriever = Retriever::new(Arc::new(adapter(provider)), store);
    let orchestrator = Orchestrator::new(retriever, generator, Arc::new(DecisionTwinSpec::default()));
    let app = router(AppState::new(Arc::new(orchestrator), 3));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_and_twin() {
    let base = start(Arc::new(ScriptedAnswer), false).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let twin: Value = client
        .get(format!("{}/twin", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(twin["inert_action"], "Do nothing");
    assert_eq!(twin["actions"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_retrieve_uses_default_k() {
    let base = start(Arc::new(ScriptedAnswer), true).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/retrieve", base))
        .json(&json!({"query": "onboarding checklist"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["k"], 3);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["chunk_id"], "yt_0_c0");
}

#[tokio::test]
async fn test_answer_returns_prompt_and_compliance() {
    let base = start(Arc::new(ScriptedAnswer), true).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/answer", base))
        .json(&json!({"query": "Lapsed users ignore email", "k": 4, "prompt_version": "v2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["use_rag"], true);
    assert_eq!(body["retrieved"].as_array().unwrap().len(), 4);
    assert!(body["prompt"].as_str().unwrap().contains("Recommended Action:"));
    assert_eq!(body["compliance"]["action_in_set"], true);
}

#[tokio::test]
async fn test_answer_without_k_uses_configured_top_k() {
    let base = start(Arc::new(ScriptedAnswer), true).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/answer", base))
        .json(&json!({"query": "Lapsed users ignore email"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["k"], 3);
    assert_eq!(body["retrieved"].as_array().unwrap().len(), 3);
    assert_eq!(body["prompt_version"], "v2");
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let base = start(Arc::new(ScriptedAnswer), true).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/answer", base))
        .json(&json!({"query": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_empty_store_is_retrieval_unavailable() {
    let base = start(Arc::new(ScriptedAnswer), false).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/retrieve", base))
        .json(&json!({"query": "anything"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "retrieval_unavailable");
}

#[tokio::test]
async fn test_exhausted_generator_is_bad_gateway() {
    let base = start(Arc::new(Exhausted), true).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/answer", base))
        .json(&json!({"query": "anything", "use_rag": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "provider_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("quota"));
}
