use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a saved chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    /// Persona the session belongs to
    pub persona_id: String,
    /// Display name of the persona (falls back to the id if it was deleted)
    pub persona_name: String,
    /// When the session was first saved
    pub created_at: DateTime<Utc>,
    /// When the session was last saved
    pub updated_at: DateTime<Utc>,
    /// Number of turns stored
    pub turn_count: usize,
}
