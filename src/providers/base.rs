//! Base provider traits and types
//!
//! Defines the two collaborator seams of the application: [`Provider`] turns
//! a prompt into a lazy stream of text fragments, and [`Embedder`] turns text
//! into fixed-length vectors.

use crate::error::{RagPersonaError, Result};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

/// Token usage information reported at the end of a generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use ragpersona::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Sampling options forwarded to the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_ctx: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            num_ctx: 4096,
        }
    }
}

/// A single prompt dispatched to the inference collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Model to run
    pub model: String,
    /// Fully assembled prompt
    pub prompt: String,
    /// Sampling options
    pub options: GenerationOptions,
}

/// One item of a generation stream
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Next piece of generated text
    Fragment(String),
    /// Normal end of stream. A stream that ends without this event was truncated.
    Done {
        /// Usage, when the server reports it
        usage: Option<TokenUsage>,
    },
}

/// Lazy, pull-based stream of generation events
///
/// Dropping the stream stops consumption and releases the underlying request.
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationEvent>> + Send>>;

/// Model information for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Unique identifier for the model (e.g., "llama3.2:latest")
    pub name: String,
    /// Human-readable size of the model weights
    pub size: String,
    /// Last modification time as reported by the server
    pub modified_at: String,
    /// Provider-specific metadata (key-value pairs)
    pub provider_specific: HashMap<String, String>,
}

impl ModelInfo {
    /// Create a new ModelInfo instance
    pub fn new(name: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
            modified_at: String::new(),
            provider_specific: HashMap::new(),
        }
    }

    /// Add provider-specific metadata
    pub fn set_provider_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.provider_specific.insert(key.into(), value.into());
    }
}

/// Inference collaborator: prompt in, streamed text out
///
/// # Examples
///
/// ```no_run
/// use ragpersona::providers::{GenerationEvent, GenerationRequest, GenerationStream, Provider};
/// use ragpersona::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     async fn generate(&self, request: &GenerationRequest) -> Result<GenerationStream> {
///         let events = vec![
///             Ok(GenerationEvent::Fragment(request.prompt.clone())),
///             Ok(GenerationEvent::Done { usage: None }),
///         ];
///         Ok(Box::pin(futures::stream::iter(events)))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Dispatch a prompt and return the lazy fragment stream
    ///
    /// # Errors
    ///
    /// Returns `InferenceUnavailable` when the server cannot be reached and
    /// `ModelNotFound` when the model is not installed. Errors after the
    /// stream has started are yielded as stream items.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationStream>;

    /// List available models
    ///
    /// The default implementation reports that listing is unsupported.
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Err(RagPersonaError::InferenceUnavailable(
            "Model listing is not supported by this provider".to_string(),
        )
        .into())
    }

    /// Check that the inference server is reachable
    ///
    /// The default implementation assumes the provider is always available.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Embedding collaborator: text in, fixed-length vectors out
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identity of the embedding model, recorded per knowledge base
    fn model_id(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RagPersonaError::InferenceUnavailable("Embedder returned no vector".to_string()).into()
        })
    }
}

/// Check an embedding batch: one vector per input, all of the same non-zero
/// dimension. Returns the dimension (0 for an empty batch).
pub fn validate_embeddings(inputs: usize, vectors: &[Vec<f32>]) -> Result<usize> {
    if vectors.len() != inputs {
        return Err(RagPersonaError::InferenceUnavailable(format!(
            "Embedder returned {} vectors for {} inputs",
            vectors.len(),
            inputs
        ))
        .into());
    }

    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    if vectors.iter().any(|v| v.len() != dimension || v.is_empty()) {
        return Err(RagPersonaError::InferenceUnavailable(
            "Embedder returned vectors of inconsistent dimension".to_string(),
        )
        .into());
    }

    Ok(dimension)
}
