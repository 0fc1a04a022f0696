//! Provider module for RagPersona
//!
//! This module contains the inference and embedding abstractions and their
//! Ollama implementations.

pub mod base;
pub mod ollama;

pub use base::{
    validate_embeddings, Embedder, GenerationEvent, GenerationOptions, GenerationRequest,
    GenerationStream, ModelInfo, Provider, TokenUsage,
};
pub use ollama::{OllamaEmbedder, OllamaProvider};

use crate::config::OllamaConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create the inference provider from configuration
///
/// # Errors
///
/// Returns error if the HTTP client cannot be initialized
pub fn create_provider(config: &OllamaConfig) -> Result<Arc<dyn Provider>> {
    Ok(Arc::new(OllamaProvider::new(config)?))
}

/// Create the embedder from configuration
///
/// # Errors
///
/// Returns error if the HTTP client cannot be initialized
pub fn create_embedder(config: &OllamaConfig) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(OllamaEmbedder::new(config)?))
}

/// Create an embedder for `model` on the configured Ollama host
///
/// # Errors
///
/// Returns error if the HTTP client cannot be initialized
pub fn create_embedder_for(config: &OllamaConfig, model: &str) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(OllamaEmbedder::with_model(config, model)?))
}

/// Sampling options taken from configuration
pub fn generation_options(config: &OllamaConfig) -> GenerationOptions {
    GenerationOptions {
        temperature: config.temperature,
        top_p: config.top_p,
        num_ctx: config.num_ctx,
    }
}
