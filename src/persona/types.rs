use crate::error::{RagPersonaError, Result};
use crate::rag::KbStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted persona name, in characters
pub const MAX_NAME_LEN: usize = 100;

/// Storage key of a persona: names are unique case-insensitively
///
/// # Examples
///
/// ```
/// use ragpersona::persona::persona_key;
///
/// assert_eq!(persona_key("  Rick Sanchez "), "rick sanchez");
/// ```
pub fn persona_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Validate a display name and return it trimmed
pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RagPersonaError::InvalidInput("persona name cannot be empty".to_string()).into());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RagPersonaError::InvalidInput(format!(
            "persona name must be at most {} characters",
            MAX_NAME_LEN
        ))
        .into());
    }
    if name.chars().any(char::is_control) {
        return Err(RagPersonaError::InvalidInput(
            "persona name cannot contain control characters".to_string(),
        )
        .into());
    }
    Ok(name.to_string())
}

/// One ingested document of a persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSource {
    /// Human name of the source, unique within the persona
    pub label: String,
    /// Where the text came from (file path or content identifier)
    pub origin: String,
    /// Chunks produced by the last ingestion
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// A conversational identity backed by a knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Case-folded name, the storage key
    pub id: String,
    /// Name as the user typed it
    pub name: String,
    pub description: String,
    /// Embedding model the knowledge base is built with
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    pub last_interaction: Option<DateTime<Utc>>,
    /// Sources in ingestion order
    pub sources: Vec<TranscriptSource>,
}

impl Persona {
    /// Build a new persona, validating the name
    pub fn new(name: &str, description: &str, embedding_model: &str) -> Result<Self> {
        let name = validate_name(name)?;
        Ok(Self {
            id: persona_key(&name),
            name,
            description: description.trim().to_string(),
            embedding_model: embedding_model.to_string(),
            created_at: Utc::now(),
            last_interaction: None,
            sources: Vec::new(),
        })
    }

    /// Find a source by label (exact match)
    pub fn source(&self, label: &str) -> Option<&TranscriptSource> {
        self.sources.iter().find(|s| s.label == label)
    }

    /// Total chunk count across recorded sources
    pub fn recorded_chunks(&self) -> usize {
        self.sources.iter().map(|s| s.chunk_count).sum()
    }
}

/// Row of the persona listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: KbStatus,
    pub source_count: usize,
    /// Chunks actually present in the knowledge base
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_interaction: Option<DateTime<Utc>>,
}
