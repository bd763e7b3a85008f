
use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 600;
const PING_TIMEOUT_SECONDS: u64 = 2;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Client for a local Ollama daemon: readiness, model lifecycle and text
/// generation. Embeddings go through
/// [`EmbeddingClient`](crate::embeddings::EmbeddingClient).
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    response: Option<String>,
}

#[derive(Debug, Serialize)]
struct PullRequest {
    model: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    status: Option<String>,
    completed: Option<u64>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.ollama.model.clone(),
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Whether the daemon answers on its tags endpoint.
    #[inline]
    pub fn is_up(&self) -> bool {
        let Ok(url) = self.base_url.join("/api/tags") else {
            return false;
        };

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(PING_TIMEOUT_SECONDS)))
            .build()
            .into();

        agent.get(url.as_str()).call().is_ok()
    }

    /// Ensure the daemon is running, starting it when necessary.
    ///
    /// Spawns `ollama serve` detached and polls until the daemon answers
    /// or `wait` expires.
    #[inline]
    pub fn ensure_ready(&self, wait: Duration) -> Result<()> {
        if self.is_up() {
            debug!("Ollama daemon already running at {}", self.base_url);
            return Ok(());
        }

        info!("Starting Ollama daemon");
        self.spawn_daemon()?;

        let started = Instant::now();
        while started.elapsed() < wait {
            if self.is_up() {
                info!(
                    "Ollama daemon is up after {:.1}s",
                    started.elapsed().as_secs_f64()
                );
                return Ok(());
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }

        bail!(
            "Ollama daemon failed to start within {}s",
            wait.as_secs()
        );
    }

    /// Ensure `model` is available locally, pulling it when missing.
    #[inline]
    pub fn ensure_model(&self, model: &str) -> Result<()> {
        match self.list_models() {
            Ok(models) => {
                if models.iter().any(|m| m.name == model) {
                    debug!("Model {} is available", model);
                    return Ok(());
                }
            }
            Err(e) => {
                warn!("Checking model '{}' failed, will try pulling: {}", model, e);
            }
        }

        self.pull_model(model)
    }

    /// List all models known to the daemon.
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        let response_text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate a complete answer for `prompt` in one blocking call.
    #[inline]
    pub fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_owned(),
            stream: false,
        };

        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generate URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generate request")?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Ollama generate call failed")?;

        let generate_response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse generate response")?;

        Ok(generate_response.response)
    }

    /// Stream an answer for `prompt`, passing each incremental fragment to
    /// `on_piece` as it arrives. The stream ends when the daemon closes
    /// the connection; malformed lines are skipped.
    #[inline]
    pub fn stream<F>(&self, prompt: &str, mut on_piece: F) -> Result<()>
    where
        F: FnMut(&str),
    {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_owned(),
            stream: true,
        };

        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generate URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generate request")?;

        let mut response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .context("Ollama streaming call failed")?;

        let reader = BufReader::new(response.body_mut().as_reader());
        for line in reader.lines() {
            let line = line.context("Failed to read generation stream")?;
            if line.is_empty() {
                continue;
            }

            let Ok(chunk) = serde_json::from_str::<StreamChunk>(&line) else {
                continue;
            };

            if let Some(piece) = chunk.response {
                on_piece(&piece);
            }
        }

        Ok(())
    }

    fn spawn_daemon(&self) -> Result<()> {
        let spawned = Command::new("ollama")
            .arg("serve")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            // The child is intentionally left running detached.
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!("Ollama not installed or not on PATH")
            }
            Err(e) => Err(e).context("Failed to start Ollama daemon"),
        }
    }

    fn pull_model(&self, model: &str) -> Result<()> {
        info!("Pulling model '{}'", model);

        let request = PullRequest {
            model: model.to_owned(),
            stream: true,
        };

        let url = self
            .base_url
            .join("/api/pull")
            .context("Failed to build pull URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize pull request")?;

        let mut response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .with_context(|| format!("Failed to pull model '{}'", model))?;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(100).with_style(
                ProgressStyle::with_template("{bar:40} {pos}% {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(format!("pulling {}", model));

        let reader = BufReader::new(response.body_mut().as_reader());
        for line in reader.lines() {
            let line = line.with_context(|| format!("Pull stream failed for '{}'", model))?;
            if line.is_empty() {
                continue;
            }

            let Ok(progress) = serde_json::from_str::<PullProgress>(&line) else {
                continue;
            };

            if let (Some(completed), Some(total)) = (progress.completed, progress.total) {
                if total > 0 {
                    bar.set_position(completed * 100 / total);
                }
            }
            if let Some(status) = progress.status {
                bar.set_message(status);
            }
        }

        bar.finish_and_clear();
        info!("Pull complete for model '{}'", model);
        Ok(())
    }
}
