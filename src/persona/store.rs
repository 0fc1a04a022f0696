//! Persona store
//!
//! CRUD over persona metadata, coupled to the knowledge-base lifecycle of the
//! [`EmbeddingIndex`]. Deletion is two-phase: the knowledge base goes first,
//! then the metadata, so a failure in between leaves the persona visible as
//! "Missing KB" and the delete can simply be retried.

use crate::config::RagConfig;
use crate::error::{RagPersonaError, Result};
use crate::persona::types::{persona_key, Persona, PersonaSummary, TranscriptSource};
use crate::rag::{chunk, EmbeddingIndex, KbStatus};
use crate::storage::{parse_timestamp, SqliteStorage};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Persona metadata store
pub struct PersonaStore {
    storage: SqliteStorage,
    index: Arc<EmbeddingIndex>,
    rag: RagConfig,
}

impl PersonaStore {
    pub fn new(storage: SqliteStorage, index: Arc<EmbeddingIndex>, rag: RagConfig) -> Self {
        Self {
            storage,
            index,
            rag,
        }
    }

    /// The embedding index this store manages knowledge bases in
    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Create a persona with an empty knowledge base
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if a persona with the same name exists
    /// (case-insensitive) and `InvalidInput` for an invalid name.
    pub fn create(&self, name: &str, description: &str) -> Result<Persona> {
        let persona = Persona::new(name, description, self.index.embedding_model())?;

        let conn = self.storage.connection()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO personas (id, name, description, embedding_model, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    persona.id,
                    persona.name,
                    persona.description,
                    persona.embedding_model,
                    persona.created_at.to_rfc3339()
                ],
            )
            .context("Failed to insert persona")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        if inserted == 0 {
            return Err(RagPersonaError::DuplicateName(persona.name).into());
        }

        self.index.create_partition(&persona.id)?;

        tracing::info!(persona = %persona.name, "Created persona");
        Ok(persona)
    }

    /// Look up a persona by name (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, with a suggestion when a similar name exists.
    pub fn get(&self, name: &str) -> Result<Persona> {
        let conn = self.storage.connection()?;
        match load_persona(&conn, &persona_key(name))? {
            Some(persona) => Ok(persona),
            None => Err(self.not_found(&conn, name)),
        }
    }

    /// Summaries of all personas, sorted by id
    pub fn list(&self) -> Result<Vec<PersonaSummary>> {
        let conn = self.storage.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT p.id, p.name, p.description, p.created_at, p.last_interaction,
                    (SELECT count(*) FROM sources s WHERE s.persona_id = p.id)
                FROM personas p
                ORDER BY p.id",
            )
            .context("Failed to prepare statement")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let created_at: String = row.get(3)?;
                let last_interaction: Option<String> = row.get(4)?;
                let source_count: i64 = row.get(5)?;
                Ok(PersonaSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    status: KbStatus::MissingKb,
                    source_count: source_count.max(0) as usize,
                    chunk_count: 0,
                    created_at: parse_timestamp(&created_at),
                    last_interaction: last_interaction.as_deref().map(parse_timestamp),
                })
            })
            .context("Failed to query personas")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        let mut summaries = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read persona row")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        for summary in &mut summaries {
            summary.status = self.index.status(&summary.id);
            if summary.status != KbStatus::MissingKb {
                summary.chunk_count = self.index.chunk_count(&summary.id).unwrap_or(0);
            }
        }

        Ok(summaries)
    }

    /// Chunk `source_text`, index it and record the source on the persona
    ///
    /// Re-adding an existing label replaces that source's chunks atomically
    /// and keeps its place in the source list. The source record is written
    /// in the same transaction as the chunks.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown persona, `NoTranscriptAvailable` for
    /// empty text, and propagates indexing errors (the previous chunks of the
    /// source stay in place).
    pub async fn add_source(
        &self,
        name: &str,
        source_text: &str,
        source_label: &str,
        origin: &str,
    ) -> Result<TranscriptSource> {
        let persona = self.get(name)?;
        let label = source_label.trim();
        if label.is_empty() {
            return Err(
                RagPersonaError::InvalidInput("source label cannot be empty".to_string()).into(),
            );
        }

        let chunks = chunk(source_text, self.rag.chunk_size, self.rag.chunk_overlap)?;
        if chunks.is_empty() {
            return Err(RagPersonaError::NoTranscriptAvailable(format!(
                "source '{}' contains no text",
                label
            ))
            .into());
        }

        tracing::info!(
            persona = %persona.name,
            source = label,
            chunks = chunks.len(),
            "Ingesting source"
        );
        if self.index.partition(&persona.id)?.is_none() {
            tracing::warn!(persona = %persona.name, "Knowledge base partition missing, recreating it");
            self.index
                .create_partition_for_model(&persona.id, &persona.embedding_model)?;
        }

        let ingested_at = Utc::now();
        let chunk_count = self
            .index
            .upsert_with(&persona.id, label, &chunks, |tx, chunk_count| {
                tx.execute(
                    "INSERT INTO sources (persona_id, label, origin, chunk_count, ingested_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(persona_id, label) DO UPDATE SET
                        origin = excluded.origin,
                        chunk_count = excluded.chunk_count,
                        ingested_at = excluded.ingested_at",
                    params![
                        persona.id,
                        label,
                        origin,
                        chunk_count as i64,
                        ingested_at.to_rfc3339()
                    ],
                )
                .context("Failed to record source")?;
                Ok(())
            })
            .await?;

        let source = TranscriptSource {
            label: label.to_string(),
            origin: origin.to_string(),
            chunk_count,
            ingested_at,
        };

        Ok(source)
    }

    /// Remove one source and its chunks
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the persona or the source label does not exist.
    pub fn remove_source(&self, name: &str, source_label: &str) -> Result<()> {
        let persona = self.get(name)?;
        if persona.source(source_label).is_none() {
            let suggestion = suggest(source_label, persona.sources.iter().map(|s| s.label.as_str()));
            return Err(RagPersonaError::source_not_found(source_label)
                .with_suggestion(suggestion)
                .into());
        }

        self.index.delete_source(&persona.id, source_label)?;

        let conn = self.storage.connection()?;
        conn.execute(
            "DELETE FROM sources WHERE persona_id = ?1 AND label = ?2",
            params![persona.id, source_label],
        )
        .context("Failed to delete source record")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        tracing::info!(persona = %persona.name, source = source_label, "Removed source");
        Ok(())
    }

    /// Delete a persona, its knowledge base and its saved chat session
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the persona does not exist. If the metadata
    /// removal fails after the knowledge base was dropped, the persona stays
    /// listed as "Missing KB" and the call can be repeated.
    pub fn delete(&self, name: &str) -> Result<()> {
        let persona = self.get(name)?;

        self.index.delete_persona(&persona.id)?;

        let mut conn = self.storage.connection()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
        tx.execute(
            "DELETE FROM sources WHERE persona_id = ?",
            params![persona.id],
        )
        .context("Failed to delete sources")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
        tx.execute(
            "DELETE FROM chat_sessions WHERE persona_id = ?",
            params![persona.id],
        )
        .context("Failed to delete chat session")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
        tx.execute("DELETE FROM personas WHERE id = ?", params![persona.id])
            .context("Failed to delete persona")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        tracing::info!(persona = %persona.name, "Deleted persona");
        Ok(())
    }

    /// Record that the persona just answered a message
    pub fn touch(&self, persona_id: &str) -> Result<()> {
        let conn = self.storage.connection()?;
        conn.execute(
            "UPDATE personas SET last_interaction = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), persona_id],
        )
        .context("Failed to update last interaction")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Knowledge base health of a persona
    pub fn status(&self, persona: &Persona) -> KbStatus {
        self.index.status(&persona.id)
    }

    fn not_found(&self, conn: &Connection, name: &str) -> anyhow::Error {
        let names = all_names(conn).unwrap_or_default();
        let suggestion = suggest(name, names.iter().map(String::as_str));
        RagPersonaError::persona_not_found(name.trim())
            .with_suggestion(suggestion)
            .into()
    }
}

/// Closest candidate by Jaro-Winkler similarity, compared case-insensitively
fn suggest<'a>(wanted: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let wanted = wanted.trim().to_lowercase();
    let mut best_score = SUGGESTION_THRESHOLD;
    let mut best_match = None;

    for candidate in candidates {
        let score = strsim::jaro_winkler(&wanted, &candidate.to_lowercase());
        if score > best_score {
            best_score = score;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}

fn all_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM personas")
        .context("Failed to prepare statement")?;
    let names = stmt
        .query_map([], |row| row.get(0))
        .context("Failed to query names")?
        .collect::<rusqlite::Result<Vec<String>>>()
        .context("Failed to read name")?;
    Ok(names)
}

fn load_persona(conn: &Connection, persona_id: &str) -> Result<Option<Persona>> {
    let row = conn
        .query_row(
            "SELECT name, description, embedding_model, created_at, last_interaction
            FROM personas WHERE id = ?",
            params![persona_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()
        .context("Failed to query persona")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

    let Some((name, description, embedding_model, created_at, last_interaction)) = row else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT label, origin, chunk_count, ingested_at FROM sources
            WHERE persona_id = ? ORDER BY rowid",
        )
        .context("Failed to prepare statement")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
    let sources = stmt
        .query_map(params![persona_id], |row| {
            let chunk_count: i64 = row.get(2)?;
            let ingested_at: String = row.get(3)?;
            Ok(TranscriptSource {
                label: row.get(0)?,
                origin: row.get(1)?,
                chunk_count: chunk_count.max(0) as usize,
                ingested_at: parse_timestamp(&ingested_at),
            })
        })
        .context("Failed to query sources")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read source row")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

    Ok(Some(Persona {
        id: persona_id.to_string(),
        name,
        description,
        embedding_model,
        created_at: parse_timestamp(&created_at),
        last_interaction: last_interaction.as_deref().map(parse_timestamp),
        sources,
    }))
}
