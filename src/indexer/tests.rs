use super::*;
use crate::config::Config;
use crate::store::IndexStore;
use httpmock::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn test_builder(server: &MockServer, folder: &Path) -> IndexBuilder {
    let mut config = Config::default();
    config.ollama.host = server.host();
    config.ollama.port = server.port();
    config.embedding.model = "test-embed".to_string();

    IndexBuilder {
        chunker: TokenChunker::new().expect("chunker should initialize"),
        embeddings: EmbeddingClient::new(&config)
            .expect("embedding client should build")
            .with_retry_attempts(0),
        ollama: OllamaClient::new(&config).expect("ollama client should build"),
        pdf_folder: folder.to_path_buf(),
        window_size: 500,
        overlap: 50,
        embed_model: "test-embed".to_string(),
        flush_batch: 2,
    }
}

fn test_store(temp_dir: &TempDir) -> IndexStore {
    IndexStore::new(
        temp_dir.path().join("pdf_index.bin"),
        temp_dir.path().join("metadata.jsonl"),
    )
}

fn chunk(file: &str, text: &str) -> DocumentChunk {
    DocumentChunk {
        file: file.to_string(),
        section: "Introduction".to_string(),
        text: text.to_string(),
    }
}

fn mock_embedding(server: &MockServer, prompt: &str, embedding: &[f32]) {
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/embeddings")
            .json_body(json!({"model": "test-embed", "prompt": prompt}));
        then.status(200).json_body(json!({"embedding": embedding}));
    });
}

fn mock_failing_embedding(server: &MockServer, prompt: &str) {
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/embeddings")
            .json_body(json!({"model": "test-embed", "prompt": prompt}));
        then.status(500).body("embedding backend unavailable");
    });
}

fn mock_healthy_daemon(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/api/tags");
        then.status(200)
            .json_body(json!({"models": [{"name": "test-embed"}]}));
    });
}

#[test]
fn skips_build_when_artifacts_exist() {
    let server = MockServer::start();
    let tags = server.mock(|when, then| {
        when.method(GET).path("/api/tags");
        then.status(200).json_body(json!({"models": []}));
    });

    let corpus = TempDir::new().expect("should create TempDir");
    let artifacts = TempDir::new().expect("should create TempDir");
    let mut store = test_store(&artifacts);

    fs::write(store.index_path(), b"index blob").expect("should write index");
    fs::write(store.metadata_path(), b"{\"file\":\"a\"}\n").expect("should write metadata");

    let builder = test_builder(&server, corpus.path());
    let outcome = builder
        .build(&mut store, false)
        .expect("existing artifacts mean a no-op");

    assert_eq!(outcome, BuildOutcome::AlreadyExists);
    // Idempotent skip: both files stay byte-identical.
    assert_eq!(
        fs::read(store.index_path()).expect("index readable"),
        b"index blob"
    );
    assert_eq!(
        fs::read(store.metadata_path()).expect("metadata readable"),
        b"{\"file\":\"a\"}\n"
    );
    tags.assert_hits(0);
}

#[test]
fn rebuild_deletes_artifacts_up_front() {
    let server = MockServer::start();
    mock_healthy_daemon(&server);

    let corpus = TempDir::new().expect("should create TempDir");
    let artifacts = TempDir::new().expect("should create TempDir");
    let mut store = test_store(&artifacts);

    fs::write(store.index_path(), b"stale index").expect("should write index");
    fs::write(store.metadata_path(), b"stale metadata").expect("should write metadata");

    let builder = test_builder(&server, corpus.path());
    let result = builder.build(&mut store, true);

    // The empty corpus aborts the build, but the stale artifacts were
    // already removed by the rebuild request.
    assert!(result.is_err());
    assert!(!store.artifacts_exist());
}

#[test]
fn empty_corpus_is_fatal() {
    let server = MockServer::start();
    mock_healthy_daemon(&server);

    let corpus = TempDir::new().expect("should create TempDir");
    let artifacts = TempDir::new().expect("should create TempDir");
    let mut store = test_store(&artifacts);

    let builder = test_builder(&server, corpus.path());
    let result = builder.build(&mut store, false);

    assert!(result.is_err());
    assert!(
        result
            .expect_err("empty corpus must fail")
            .to_string()
            .contains("No PDF chunks found")
    );
    assert!(!store.index_path().exists());
}

#[test]
fn row_identity_holds_after_build() {
    let server = MockServer::start();
    mock_embedding(&server, "alpha text", &[1.0, 0.0]);
    mock_embedding(&server, "beta text", &[0.0, 1.0]);
    mock_embedding(&server, "gamma text", &[1.0, 1.0]);

    let corpus = TempDir::new().expect("should create TempDir");
    let artifacts = TempDir::new().expect("should create TempDir");
    let mut store = test_store(&artifacts);

    let chunks = vec![
        chunk("a.pdf", "alpha text"),
        chunk("a.pdf", "beta text"),
        chunk("b.pdf", "gamma text"),
    ];

    let builder = test_builder(&server, corpus.path());
    let outcome = builder
        .build_from_chunks(&chunks, &mut store)
        .expect("build should succeed");

    assert_eq!(
        outcome,
        BuildOutcome::Built {
            vectors: 3,
            skipped_chunks: 0,
        }
    );

    let index = FlatIndex::load(store.index_path()).expect("index should load");
    let metadata = store.load_metadata().expect("metadata should load");

    assert_eq!(index.len(), metadata.len());
    assert_eq!(metadata.len(), 3);
    assert_eq!(metadata[0].chunk, "alpha text");
    assert_eq!(metadata[1].chunk, "beta text");
    assert_eq!(metadata[2].file, "b.pdf");
}

#[test]
fn failed_chunk_is_skipped_in_both_stores() {
    let server = MockServer::start();
    for i in 0..10 {
        let prompt = format!("chunk-{}", i);
        if i == 7 {
            mock_failing_embedding(&server, &prompt);
        } else {
            mock_embedding(&server, &prompt, &[i as f32]);
        }
    }

    let corpus = TempDir::new().expect("should create TempDir");
    let artifacts = TempDir::new().expect("should create TempDir");
    let mut store = test_store(&artifacts);

    let chunks: Vec<DocumentChunk> = (0..10)
        .map(|i| chunk("paper.pdf", &format!("chunk-{}", i)))
        .collect();

    let builder = test_builder(&server, corpus.path());
    let outcome = builder
        .build_from_chunks(&chunks, &mut store)
        .expect("a single failing chunk must not abort the build");

    assert_eq!(
        outcome,
        BuildOutcome::Built {
            vectors: 9,
            skipped_chunks: 1,
        }
    );

    let index = FlatIndex::load(store.index_path()).expect("index should load");
    let metadata = store.load_metadata().expect("metadata should load");

    assert_eq!(index.len(), 9);
    assert_eq!(metadata.len(), 9);
    // The failed chunk is absent from the log, not blanked.
    assert_eq!(metadata[6].chunk, "chunk-6");
    assert_eq!(metadata[7].chunk, "chunk-8");
}

#[test]
fn dimensionality_locked_from_first_success() {
    let server = MockServer::start();
    mock_embedding(&server, "first", &[1.0, 2.0]);
    mock_embedding(&server, "drifted", &[1.0, 2.0, 3.0]);
    mock_embedding(&server, "second", &[3.0, 4.0]);

    let corpus = TempDir::new().expect("should create TempDir");
    let artifacts = TempDir::new().expect("should create TempDir");
    let mut store = test_store(&artifacts);

    let chunks = vec![
        chunk("a.pdf", "first"),
        chunk("a.pdf", "drifted"),
        chunk("a.pdf", "second"),
    ];

    let builder = test_builder(&server, corpus.path());
    let outcome = builder
        .build_from_chunks(&chunks, &mut store)
        .expect("dimension drift is a per-chunk failure");

    assert_eq!(
        outcome,
        BuildOutcome::Built {
            vectors: 2,
            skipped_chunks: 1,
        }
    );

    let index = FlatIndex::load(store.index_path()).expect("index should load");
    assert_eq!(index.dim(), 2);
    assert_eq!(index.len(), 2);
}

#[test]
fn all_chunks_failing_is_fatal() {
    let server = MockServer::start();
    mock_failing_embedding(&server, "one");
    mock_failing_embedding(&server, "two");

    let corpus = TempDir::new().expect("should create TempDir");
    let artifacts = TempDir::new().expect("should create TempDir");
    let mut store = test_store(&artifacts);

    let chunks = vec![chunk("a.pdf", "one"), chunk("a.pdf", "two")];

    let builder = test_builder(&server, corpus.path());
    let result = builder.build_from_chunks(&chunks, &mut store);

    assert!(result.is_err());
    // No index blob is written for a failed build.
    assert!(!store.index_path().exists());
}
