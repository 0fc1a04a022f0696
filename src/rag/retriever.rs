//! Top-K retrieval for one persona

use crate::error::Result;
use crate::persona::persona_key;
use crate::rag::index::EmbeddingIndex;
use std::sync::Arc;

/// A retrieved chunk ready for prompt assembly
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    /// Label of the source the chunk came from
    pub source_label: String,
    pub score: f32,
    pub position: usize,
}

/// Similarity retriever over an [`EmbeddingIndex`]
#[derive(Clone)]
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
}

impl Retriever {
    pub fn new(index: Arc<EmbeddingIndex>) -> Self {
        Self { index }
    }

    /// At most `k` chunks of `persona` most relevant to `query`
    ///
    /// `persona` may be the display name or the id; names are matched
    /// case-insensitively. An empty knowledge base yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMismatch` if the embedding model the persona's
    /// knowledge base was built with cannot be used.
    pub async fn retrieve(&self, persona: &str, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let persona_id = persona_key(persona);
        let scored = self.index.query_top_k(&persona_id, query, k).await?;

        Ok(scored
            .into_iter()
            .map(|sc| RetrievedChunk {
                text: sc.chunk.text,
                source_label: sc.chunk.source_id,
                score: sc.score,
                position: sc.chunk.position,
            })
            .collect())
    }
}
