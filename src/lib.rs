use thiserror::Error;

pub type Result<T> = std::result::Result<T, PapersError>;

#[derive(Error, Debug)]
pub enum PapersError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Ollama error: {0}")]
    Ollama(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod indexer;
pub mod ollama;
pub mod prompt;
pub mod store;
