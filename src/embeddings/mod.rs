
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
/// Extra attempts after the first failed request.
const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF_MS: u64 = 500;

/// Client for the embedding endpoint of a local Ollama instance.
///
/// Stateless: identical text submitted twice is embedded twice.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: Url,
    model: String,
    max_chars: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
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
            model: config.embedding.model.clone(),
            max_chars: config.embedding.max_chars,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
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

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Embed a single text into a fixed-length vector.
    ///
    /// The text is truncated to the configured char budget before
    /// submission. Transport and service failures are retried a bounded
    /// number of times; the last failure is returned once attempts are
    /// exhausted.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let prompt = truncate_chars(text, self.max_chars);
        debug!("Generating embedding for text (length: {})", prompt.len());

        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: prompt.to_owned(),
        };

        let url = self
            .base_url
            .join("/api/embeddings")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embedding")?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        debug!(
            "Generated embedding with {} dimensions",
            embed_response.embedding.len()
        );

        Ok(embed_response.embedding)
    }

    /// Embed query text. Retrieval takes a single query vector, so this is
    /// the same contract as [`embed`](Self::embed).
    #[inline]
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query)
    }

    /// Embed an ordered sequence of texts, one at a time, in order.
    ///
    /// Each item carries its own result; one item exhausting its retries
    /// does not abort the rest.
    #[inline]
    pub fn embed_batched<'a, I>(&'a self, texts: I) -> impl Iterator<Item = Result<Vec<f32>>> + 'a
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: 'a,
    {
        texts.into_iter().map(move |text| self.embed(text))
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 0..=self.retry_attempts {
            match request_fn() {
                Ok(response_text) => {
                    debug!("Embedding request succeeded on attempt {}", attempt + 1);
                    return Ok(response_text);
                }
                Err(error) => {
                    warn!(
                        "Embedding request failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.retry_attempts + 1,
                        error
                    );
                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt + 1));
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!(
            "All embedding attempts failed for request to {}",
            self.base_url
        );

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Truncate to at most `max_chars` characters, on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text.get(..idx).unwrap_or(text),
        None => text,
    }
}
