use std::path::PathBuf;

use clap::{Parser, Subcommand};
use papers_qa::Result;
use papers_qa::commands::{ask, build_index};
use papers_qa::config::{Config, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "papers-qa")]
#[command(about = "Question answering over a folder of PDF papers (flat-index retrieval + Ollama generation)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and chunking settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index the PDF folder into the vector store
    Index {
        /// Recreate the index and metadata from scratch
        #[arg(long)]
        rebuild: bool,
        /// Output path for the vector index file (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Output path for the metadata log (overrides config)
        #[arg(long)]
        meta: Option<PathBuf>,
        /// Path to the input PDF folder (overrides config)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Ask a question. Starts an interactive session if no question is given
    Ask {
        /// The question to answer
        question: Option<String>,
        /// Input path for the vector index file (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Input path for the metadata log (overrides config)
        #[arg(long)]
        meta: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index {
            rebuild,
            db,
            meta,
            input,
        } => {
            let config = Config::load()?;
            build_index(&config, rebuild, db, meta, input)?;
        }
        Commands::Ask { question, db, meta } => {
            let config = Config::load()?;
            ask(&config, question, db, meta)?;
        }
    }

    Ok(())
}
