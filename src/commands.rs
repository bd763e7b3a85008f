use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::indexer::{BuildOutcome, IndexBuilder};
use crate::ollama::OllamaClient;
use crate::prompt::{build_prompt, format_unique_contexts};
use crate::store::{IndexStore, resolve_records};

const DAEMON_READY_WAIT: Duration = Duration::from_secs(60);

/// Build (or skip, or rebuild) the vector index for the configured corpus.
#[inline]
pub fn build_index(
    config: &Config,
    rebuild: bool,
    db: Option<PathBuf>,
    meta: Option<PathBuf>,
    input: Option<PathBuf>,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(input) = input {
        config.pdf_folder = input;
    }

    if !config.pdf_folder.is_dir() {
        return Err(crate::PapersError::Config(format!(
            "Input folder not found: {}. Pass --input or set pdf_folder in the config.",
            config.pdf_folder.display()
        ))
        .into());
    }

    let (index_path, metadata_path) = resolve_artifact_paths(&config, db, meta)?;

    for path in [&index_path, &metadata_path] {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory: {}", parent.display())
                })?;
            }
        }
    }

    info!(
        "Indexing {} into {}",
        config.pdf_folder.display(),
        index_path.display()
    );

    let mut store = IndexStore::new(index_path, metadata_path);
    let builder = IndexBuilder::new(&config)?;

    match builder.build(&mut store, rebuild)? {
        BuildOutcome::AlreadyExists => {
            println!("Index exists. Use --rebuild to recreate.");
        }
        BuildOutcome::Built {
            vectors,
            skipped_chunks,
        } => {
            println!(
                "Built index with {} vectors. Metadata at {}.",
                vectors,
                store.metadata_path().display()
            );
            if skipped_chunks > 0 {
                println!(
                    "{}",
                    style(format!("Skipped {} chunks that failed embedding.", skipped_chunks))
                        .yellow()
                );
            }
        }
    }

    Ok(())
}

/// Answer a single question, or run the interactive query loop.
#[inline]
pub fn ask(
    config: &Config,
    question: Option<String>,
    db: Option<PathBuf>,
    meta: Option<PathBuf>,
) -> Result<()> {
    let ollama = OllamaClient::new(config)?;
    ollama
        .ensure_ready(DAEMON_READY_WAIT)
        .context("Ollama daemon is not available")?;

    println!("checking model '{}' (download if missing)...", config.embedding.model);
    ollama.ensure_model(&config.embedding.model)?;
    println!("checking model '{}' (download if missing)...", config.ollama.model);
    ollama.ensure_model(&config.ollama.model)?;

    let embeddings = EmbeddingClient::new(config)?;

    let (index_path, metadata_path) = resolve_artifact_paths(config, db, meta)?;
    let mut store = IndexStore::new(index_path, metadata_path);

    // Load the metadata once for the whole session; a missing artifact is
    // fatal before the first question is asked.
    store.load_metadata()?;

    let top_k = config.retrieval.top_k;

    if let Some(question) = question {
        return run_query(&mut store, &embeddings, &ollama, question.trim(), top_k);
    }

    println!("Papers QA (generation via Ollama). Type 'exit' to quit.");
    loop {
        let line: String = Input::new()
            .with_prompt("?>")
            .allow_empty(true)
            .interact_text()?;
        let question = line.trim();

        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        if let Err(e) = run_query(&mut store, &embeddings, &ollama, question, top_k) {
            println!("{}", style(format!("Error: {:#}", e)).red());
        }
    }

    Ok(())
}

fn run_query(
    store: &mut IndexStore,
    embeddings: &EmbeddingClient,
    ollama: &OllamaClient,
    question: &str,
    top_k: usize,
) -> Result<()> {
    let query_vector = embeddings.embed_query(question)?;
    let (_distances, row_ids) = store.retrieve(&query_vector, top_k)?;

    let records = store.load_metadata()?;
    let contexts = resolve_records(records, &row_ids);

    if contexts.is_empty() {
        println!("No relevant context found.");
        return Ok(());
    }

    println!("{}", format_unique_contexts(&contexts));

    let prompt = build_prompt(question, &contexts);

    println!("thinking...\n");
    ollama.stream(&prompt, |piece| {
        print!("{}", piece);
        let _ = io::stdout().flush();
    })?;
    println!();

    Ok(())
}

fn resolve_artifact_paths(
    config: &Config,
    db: Option<PathBuf>,
    meta: Option<PathBuf>,
) -> Result<(PathBuf, PathBuf)> {
    let index_path = match db {
        Some(path) => path,
        None => config
            .index_path()
            .context("Failed to resolve index path")?,
    };
    let metadata_path = match meta {
        Some(path) => path,
        None => config
            .metadata_path()
            .context("Failed to resolve metadata path")?,
    };
    Ok((index_path, metadata_path))
}
