#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a live local Ollama instance with the
// default embedding model pulled.
// Opt in with: PAPERS_QA_OLLAMA_TESTS=1 cargo test --test integration_ollama

use papers_qa::config::Config;
use papers_qa::embeddings::EmbeddingClient;
use papers_qa::ollama::OllamaClient;
use std::env;

fn live_tests_enabled() -> bool {
    env::var("PAPERS_QA_OLLAMA_TESTS").is_ok()
}

#[test]
fn live_daemon_answers() {
    if !live_tests_enabled() {
        return;
    }

    let config = Config::default();
    let client = OllamaClient::new(&config).expect("client should build");

    assert!(client.is_up(), "expected a local Ollama daemon");

    let models = client.list_models().expect("models should list");
    assert!(!models.is_empty(), "expected at least one local model");
}

#[test]
fn live_embeddings_have_stable_dimensionality() {
    if !live_tests_enabled() {
        return;
    }

    let config = Config::default();
    let client = EmbeddingClient::new(&config).expect("client should build");

    let first = client
        .embed("flat indexes scan every row")
        .expect("embedding should succeed");
    let second = client
        .embed("retrieval grounds generation")
        .expect("embedding should succeed");

    assert!(!first.is_empty());
    assert_eq!(
        first.len(),
        second.len(),
        "the embedding model must produce a fixed dimensionality"
    );
}
