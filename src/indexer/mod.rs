#[cfg(test)]
mod tests;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::chunking::{DocumentChunk, TokenChunker};
use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::ollama::OllamaClient;
use crate::store::{ChunkRecord, FlatIndex, IndexStore, MetadataWriter};

/// Vectors are buffered and appended to the index in batches of this size.
const VECTOR_FLUSH_BATCH: usize = 256;
const DAEMON_READY_WAIT: Duration = Duration::from_secs(60);

/// Orchestrates chunker, embedding gateway and vector index into a full
/// corpus build.
pub struct IndexBuilder {
    chunker: TokenChunker,
    embeddings: EmbeddingClient,
    ollama: OllamaClient,
    pdf_folder: PathBuf,
    window_size: usize,
    overlap: usize,
    embed_model: String,
    flush_batch: usize,
}

/// Result of a build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Both artifacts already exist and `rebuild` was not requested.
    AlreadyExists,
    Built {
        vectors: usize,
        skipped_chunks: usize,
    },
}

impl IndexBuilder {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            chunker: TokenChunker::new().context("Failed to initialize chunker")?,
            embeddings: EmbeddingClient::new(config)
                .context("Failed to initialize embedding client")?,
            ollama: OllamaClient::new(config).context("Failed to initialize Ollama client")?,
            pdf_folder: config.pdf_folder.clone(),
            window_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            embed_model: config.embedding.model.clone(),
            flush_batch: VECTOR_FLUSH_BATCH,
        })
    }

    /// Build the index and metadata log for the configured corpus.
    ///
    /// A no-op when both artifacts already exist and `rebuild` is false.
    /// On `rebuild`, existing artifacts are deleted up front. The embedding
    /// service is verified before any chunk is processed; an unreachable
    /// daemon, a missing model or an empty corpus abort the build without
    /// writing an index.
    #[inline]
    pub fn build(&self, store: &mut IndexStore, rebuild: bool) -> Result<BuildOutcome> {
        if !rebuild && store.artifacts_exist() {
            info!(
                "Index already exists at {}. Use --rebuild to recreate.",
                store.index_path().display()
            );
            return Ok(BuildOutcome::AlreadyExists);
        }

        if rebuild {
            store.remove_artifacts()?;
        }

        self.ollama
            .ensure_ready(DAEMON_READY_WAIT)
            .context("Ollama embeddings not available; ensure Ollama is running")?;
        self.ollama
            .ensure_model(&self.embed_model)
            .with_context(|| format!("Embedding model '{}' is not available", self.embed_model))?;

        let chunks = self
            .chunker
            .chunk_documents(&self.pdf_folder, self.window_size, self.overlap)?;

        if chunks.is_empty() {
            return Err(crate::PapersError::Chunking(format!(
                "No PDF chunks found in {}",
                self.pdf_folder.display()
            ))
            .into());
        }

        info!("Embedding {} chunks", chunks.len());
        self.build_from_chunks(&chunks, store)
    }

    /// Embed chunks in order and assemble the paired artifacts.
    ///
    /// A chunk whose embedding fails is skipped in both the index and the
    /// metadata log, keeping record count equal to row count at every
    /// accepted chunk.
    fn build_from_chunks(
        &self,
        chunks: &[DocumentChunk],
        store: &mut IndexStore,
    ) -> Result<BuildOutcome> {
        let mut writer = MetadataWriter::create(store.metadata_path())?;
        let mut index: Option<FlatIndex> = None;
        let mut buffer: Vec<Vec<f32>> = Vec::new();
        let mut skipped_chunks = 0usize;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Indexing {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let texts = chunks.iter().map(|chunk| chunk.text.as_str());
        for (chunk, embedded) in chunks.iter().zip(self.embeddings.embed_batched(texts)) {
            bar.set_message(chunk.file.clone());

            let vector = match embedded {
                Ok(vector) if !vector.is_empty() => vector,
                Ok(_) => {
                    warn!("Skipping chunk from {}: empty embedding", chunk.file);
                    skipped_chunks += 1;
                    bar.inc(1);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping chunk from {}: {}", chunk.file, e);
                    skipped_chunks += 1;
                    bar.inc(1);
                    continue;
                }
            };

            // The first successful embedding fixes the index dimensionality.
            let target = index.get_or_insert_with(|| FlatIndex::new(vector.len()));
            if vector.len() != target.dim() {
                warn!(
                    "Skipping chunk from {}: embedding dimensionality {} does not match index ({})",
                    chunk.file,
                    vector.len(),
                    target.dim()
                );
                skipped_chunks += 1;
                bar.inc(1);
                continue;
            }

            // Metadata is appended before the vector is buffered so the
            // record count never falls behind the accepted-vector count.
            writer.append(&ChunkRecord {
                file: chunk.file.clone(),
                section: chunk.section.clone(),
                chunk: chunk.text.clone(),
            })?;
            buffer.push(vector);

            if buffer.len() >= self.flush_batch {
                target.add(&buffer)?;
                buffer.clear();
            }

            bar.inc(1);
        }
        bar.finish_and_clear();

        let Some(mut index) = index else {
            bail!(
                "Vector index was not initialized: all {} chunks failed embedding",
                chunks.len()
            );
        };

        if !buffer.is_empty() {
            index.add(&buffer)?;
        }

        writer.finish()?;
        index.save(store.index_path())?;

        let vectors = index.len();
        store.cache_index(index);

        info!(
            "Built index with {} vectors ({} chunks skipped). Metadata at {}.",
            vectors,
            skipped_chunks,
            store.metadata_path().display()
        );

        Ok(BuildOutcome::Built {
            vectors,
            skipped_chunks,
        })
    }
}
