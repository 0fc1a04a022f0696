//! Ollama provider implementation
//!
//! Connects to a local or remote Ollama server. Generation uses the
//! streaming `/api/generate` endpoint, which answers with newline-delimited
//! JSON objects; embeddings use `/api/embed`; model listing and health checks
//! use `/api/tags`.

use crate::config::OllamaConfig;
use crate::error::{RagPersonaError, Result};
use crate::providers::{
    validate_embeddings, Embedder, GenerationEvent, GenerationRequest, GenerationStream,
    ModelInfo, Provider, TokenUsage,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

/// Build the shared HTTP client for Ollama calls
fn build_client(config: &OllamaConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .user_agent(concat!("ragpersona/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            RagPersonaError::InferenceUnavailable(format!("Failed to create HTTP client: {}", e))
                .into()
        })
}

/// Map a transport-level failure (refused, timeout, DNS) to a domain error
fn connection_error(host: &str, e: reqwest::Error) -> RagPersonaError {
    tracing::warn!("Ollama request to {} failed: {}", host, e);
    RagPersonaError::InferenceUnavailable(format!(
        "Cannot reach Ollama at {}: {}. Is it running?",
        host, e
    ))
}

/// Turn a non-success response into `ModelNotFound` or `InferenceUnavailable`
async fn check_status(response: Response, model: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    tracing::error!("Ollama returned error {}: {}", status, error_text);

    let lowered = error_text.to_lowercase();
    if status == StatusCode::NOT_FOUND || (lowered.contains("model") && lowered.contains("not found"))
    {
        return Err(RagPersonaError::ModelNotFound(format!(
            "'{}' is not available on the Ollama server (try `ollama pull {}`)",
            model, model
        ))
        .into());
    }

    Err(RagPersonaError::InferenceUnavailable(format!(
        "Ollama returned error {}: {}",
        status, error_text
    ))
    .into())
}

/// Ollama text generation provider
///
/// # Examples
///
/// ```no_run
/// use ragpersona::config::OllamaConfig;
/// use ragpersona::providers::{GenerationOptions, GenerationRequest, OllamaProvider, Provider};
/// use futures::StreamExt;
///
/// # async fn example() -> ragpersona::error::Result<()> {
/// let provider = OllamaProvider::new(&OllamaConfig::default())?;
/// let request = GenerationRequest {
///     model: "llama3.2".to_string(),
///     prompt: "Say hi".to_string(),
///     options: GenerationOptions::default(),
/// };
/// let mut stream = provider.generate(&request).await?;
/// while let Some(event) = stream.next().await {
///     println!("{:?}", event?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct OllamaProvider {
    client: Client,
    host: String,
}

/// Request body for /api/generate
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_ctx: usize,
}

/// One NDJSON line of a streaming /api/generate response
#[derive(Debug, Deserialize)]
struct OllamaGenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

/// Response from Ollama's /api/tags endpoint
#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

/// Model metadata from /api/tags
#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    digest: String,
    #[serde(default)]
    modified_at: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = build_client(config)?;

        tracing::info!(
            "Initialized Ollama provider: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
        })
    }

    /// Get the configured Ollama host
    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationStream> {
        let url = format!("{}/api/generate", self.host);
        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: true,
            options: OllamaOptions {
                temperature: request.options.temperature,
                top_p: request.options.top_p,
                num_ctx: request.options.num_ctx,
            },
        };

        tracing::debug!(
            model = %request.model,
            prompt_chars = request.prompt.chars().count(),
            "Sending Ollama generate request"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| connection_error(&self.host, e))?;

        let response = check_status(response, &request.model).await?;

        Ok(ndjson_events(response.bytes_stream()))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.host);
        tracing::debug!("Fetching models from Ollama: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| connection_error(&self.host, e))?;
        let response = check_status(response, "").await?;

        let tags: OllamaTagsResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama tags response: {}", e);
            RagPersonaError::InferenceUnavailable(format!("Failed to parse Ollama response: {}", e))
        })?;

        let models = tags
            .models
            .into_iter()
            .map(|tag| {
                let mut model = ModelInfo::new(&tag.name, format_size(tag.size));
                model.modified_at = tag.modified_at;
                if !tag.digest.is_empty() {
                    model.set_provider_metadata("digest", tag.digest);
                }
                model
            })
            .collect::<Vec<_>>();

        tracing::debug!("Fetched {} models from Ollama", models.len());
        Ok(models)
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.host);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| connection_error(&self.host, e))?;

        if !response.status().is_success() {
            return Err(RagPersonaError::InferenceUnavailable(format!(
                "Ollama returned status {}",
                response.status()
            ))
            .into());
        }

        Ok(())
    }
}

/// Ollama embedding model
pub struct OllamaEmbedder {
    client: Client,
    host: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    /// Create an embedder for `config.embedding_model`
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        Self::with_model(config, &config.embedding_model)
    }

    /// Create an embedder for an explicit model, e.g. the one a persona was built with
    pub fn with_model(config: &OllamaConfig, model: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            host: config.host.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.host);
        tracing::debug!(model = %self.model, inputs = texts.len(), "Embedding batch");

        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| connection_error(&self.host, e))?;
        let response = check_status(response, &self.model).await?;

        let body: OllamaEmbedResponse = response.json().await.map_err(|e| {
            RagPersonaError::InferenceUnavailable(format!("Failed to parse embed response: {}", e))
        })?;

        validate_embeddings(texts.len(), &body.embeddings)?;
        Ok(body.embeddings)
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Incremental NDJSON decoder state
struct NdjsonState {
    body: ByteStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<GenerationEvent>>,
    body_ended: bool,
    terminated: bool,
}

impl NdjsonState {
    fn push_line(&mut self, line: &[u8]) {
        if self.terminated {
            return;
        }

        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let chunk: OllamaGenerateChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.fail(format!("Malformed stream line from Ollama: {}", e));
                return;
            }
        };

        if let Some(error) = chunk.error {
            self.fail(error);
            return;
        }

        if !chunk.response.is_empty() {
            self.pending
                .push_back(Ok(GenerationEvent::Fragment(chunk.response)));
        }

        if chunk.done {
            let usage = (chunk.prompt_eval_count > 0 || chunk.eval_count > 0)
                .then(|| TokenUsage::new(chunk.prompt_eval_count, chunk.eval_count));
            self.pending.push_back(Ok(GenerationEvent::Done { usage }));
            self.terminated = true;
        }
    }

    fn fail(&mut self, message: String) {
        tracing::warn!("Ollama stream failed: {}", message);
        self.pending
            .push_back(Err(RagPersonaError::InferenceUnavailable(message).into()));
        self.terminated = true;
    }
}

/// Decode a streaming `/api/generate` body into generation events
///
/// Lines may be split across network chunks; they are buffered until a
/// newline arrives. The stream ends after `done: true`, after an error line,
/// or when the body ends (without a `Done` event, which marks truncation).
pub(crate) fn ndjson_events(
    body: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> GenerationStream {
    let state = NdjsonState {
        body: Box::pin(body),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        body_ended: false,
        terminated: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.terminated || state.body_ended {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                        state.push_line(&line);
                    }
                }
                Some(Err(e)) => {
                    state.fail(format!("Ollama stream interrupted: {}", e));
                }
                None => {
                    state.body_ended = true;
                    let rest = std::mem::take(&mut state.buffer);
                    state.push_line(&rest);
                }
            }
        }
    }))
}

/// Format byte size for display
fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.1}{}", size, UNITS[unit_idx])
}
