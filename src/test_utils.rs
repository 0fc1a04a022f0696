//! Test utilities for RagPersona
//!
//! Deterministic in-process collaborators (a bag-of-words hashing embedder
//! and a scripted inference provider) plus small filesystem helpers.

use crate::error::{RagPersonaError, Result};
use crate::providers::{
    Embedder, GenerationEvent, GenerationRequest, GenerationStream, Provider, TokenUsage,
};
use crate::rag::EmbedderFactory;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Embedder that hashes lowercase words into a fixed number of buckets
///
/// Texts sharing words get a positive cosine similarity; identical texts get
/// identical vectors.
pub struct HashEmbedder {
    model: String,
}

impl HashEmbedder {
    pub const MODEL: &'static str = "hash-embed";
    pub const DIMENSION: usize = 64;

    pub fn new() -> Self {
        Self::with_model(Self::MODEL)
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; Self::DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % Self::DIMENSION;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Factory that resolves every model name to a [`HashEmbedder`] of that name
pub fn hash_embedder_factory() -> EmbedderFactory {
    Arc::new(|model: &str| Ok(Arc::new(HashEmbedder::with_model(model)) as Arc<dyn Embedder>))
}

/// Embedder that always fails as if the server were down
pub struct FailingEmbedder {
    model: String,
}

impl FailingEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagPersonaError::InferenceUnavailable("connection refused".to_string()).into())
    }
}

/// One scripted reply of a [`ScriptedProvider`]
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these fragments then a normal `Done`
    Reply(Vec<String>),
    /// Stream these fragments then end without `Done`
    Truncated(Vec<String>),
    /// Stream these fragments then yield a mid-stream error
    BreaksAfter(Vec<String>),
    /// Stream these fragments then never yield again
    Hangs(Vec<String>),
    /// Fail the dispatch itself as unreachable
    Unavailable,
    /// Fail the dispatch itself as an unknown model
    UnknownModel,
}

/// Provider that replays scripted replies in order and records every request
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a single complete reply split into fragments
    pub fn replying(fragments: &[&str]) -> Self {
        Self::new(vec![Script::Reply(
            fragments.iter().map(|f| f.to_string()).collect(),
        )])
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

fn fragments(items: Vec<String>) -> Vec<Result<GenerationEvent>> {
    items.into_iter().map(|f| Ok(GenerationEvent::Fragment(f))).collect()
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationStream> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .unwrap_or(Script::Reply(vec!["...".to_string()]));

        let stream: GenerationStream = match script {
            Script::Reply(items) => {
                let mut events = fragments(items);
                events.push(Ok(GenerationEvent::Done {
                    usage: Some(TokenUsage::new(10, 5)),
                }));
                Box::pin(futures::stream::iter(events))
            }
            Script::Truncated(items) => Box::pin(futures::stream::iter(fragments(items))),
            Script::BreaksAfter(items) => {
                let mut events = fragments(items);
                events.push(Err(RagPersonaError::InferenceUnavailable(
                    "connection reset".to_string(),
                )
                .into()));
                Box::pin(futures::stream::iter(events))
            }
            Script::Hangs(items) => Box::pin(
                futures::stream::iter(fragments(items)).chain(futures::stream::pending()),
            ),
            Script::Unavailable => {
                return Err(
                    RagPersonaError::InferenceUnavailable("connection refused".to_string()).into(),
                )
            }
            Script::UnknownModel => {
                return Err(RagPersonaError::ModelNotFound(request.model.clone()).into())
            }
        };

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::vector::cosine_similarity;

    #[test]
    fn test_hash_embedder_similarity_tracks_shared_words() {
        let a = HashEmbedder::vector("my name is Rick");
        let b = HashEmbedder::vector("what is your name");
        let c = HashEmbedder::vector("portal gun science");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
        assert_eq!(a, HashEmbedder::vector("MY NAME is rick"));
    }

    #[tokio::test]
    async fn test_scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new(vec![Script::Unavailable, Script::Reply(vec![
            "hi".to_string(),
        ])]);
        let request = GenerationRequest {
            model: "m".to_string(),
            prompt: "p".to_string(),
            options: Default::default(),
        };

        assert!(provider.generate(&request).await.is_err());
        let events: Vec<_> = provider.generate(&request).await.unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(provider.requests().len(), 2);
    }
}
