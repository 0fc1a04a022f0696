use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Atomic retrieval unit stored in a persona's knowledge base
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic id derived from persona, source and position
    pub id: String,
    /// Owning persona
    pub persona_id: String,
    /// Owning source (its label)
    pub source_id: String,
    /// Position of the chunk within its source
    pub position: usize,
    /// Raw chunk text
    pub text: String,
    /// Embedding vector
    pub vector: Vec<f32>,
}

/// A chunk with its similarity to a query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Per-persona knowledge base record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbPartition {
    pub persona_id: String,
    /// Embedding model the knowledge base was built with
    pub embedding_model: String,
    /// Vector dimension, known once the first chunk is stored
    pub dimension: Option<usize>,
    pub created_at: DateTime<Utc>,
}

/// Health of a persona's knowledge base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KbStatus {
    /// Partition present with at least one chunk
    Active,
    /// Partition present, no chunks yet. Retrieval returns nothing.
    Empty,
    /// Metadata exists but the partition is missing or unreadable
    MissingKb,
}

impl fmt::Display for KbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Empty => write!(f, "Empty"),
            Self::MissingKb => write!(f, "Missing KB"),
        }
    }
}

/// Stable chunk id: the same persona, source and position always give the same id
///
/// # Examples
///
/// ```
/// use ragpersona::rag::chunk_id;
///
/// assert_eq!(chunk_id("rick", "clip1", 0), chunk_id("rick", "clip1", 0));
/// assert_ne!(chunk_id("rick", "clip1", 0), chunk_id("rick", "clip1", 1));
/// ```
pub fn chunk_id(persona_id: &str, source_id: &str, position: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(persona_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(position.to_le_bytes());
    let digest = hasher.finalize();

    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}
