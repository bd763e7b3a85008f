// Configuration management module
// Handles TOML configuration management and settings

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ChunkingConfig, Config, ConfigError, EmbeddingConfig, OllamaConfig, RetrievalConfig,
};
