//! Embedding indexer over SQLite
//!
//! Chunks are embedded through the [`Embedder`] collaborator and stored in
//! the `chunks` table, partitioned by persona. Every read and write filters
//! on `persona_id`, so a query against one persona can never surface another
//! persona's chunks.
//!
//! Each partition records the embedding model it was built with, and every
//! later ingestion or query of that persona embeds with that model. The
//! index's default embedder only decides the model of new partitions.
//!
//! Replacing a source is a single transaction (delete the source's chunks,
//! insert the new set). All embedding happens before the transaction starts,
//! so a failed embedding leaves the previous chunks untouched, and readers
//! see either the old or the new set, never a mixture.

use crate::error::{RagPersonaError, Result};
use crate::providers::{validate_embeddings, Embedder};
use crate::rag::types::{chunk_id, Chunk, KbPartition, KbStatus, ScoredChunk};
use crate::rag::vector::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::storage::{parse_timestamp, SqliteStorage};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::cmp::Ordering;
use std::sync::Arc;

/// Builds the embedder for a named embedding model
pub type EmbedderFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn Embedder>> + Send + Sync>;

/// Persona-partitioned vector index
pub struct EmbeddingIndex {
    storage: SqliteStorage,
    embedder: Arc<dyn Embedder>,
    factory: Option<EmbedderFactory>,
}

impl EmbeddingIndex {
    /// Create an index backed by `storage` that embeds with `embedder`
    ///
    /// Without a factory the index is pinned to `embedder`'s model and
    /// partitions built with any other model are rejected.
    pub fn new(storage: SqliteStorage, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            storage,
            embedder,
            factory: None,
        }
    }

    /// Resolve partitions built with other models through `factory`
    pub fn with_embedder_factory(mut self, factory: EmbedderFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Embedding model recorded for new partitions
    pub fn embedding_model(&self) -> &str {
        self.embedder.model_id()
    }

    /// Create the knowledge-base partition of a persona
    ///
    /// Existing partitions are left as they are.
    pub fn create_partition(&self, persona_id: &str) -> Result<KbPartition> {
        self.create_partition_for_model(persona_id, self.embedder.model_id())
    }

    /// Create a partition recorded as built with `model`
    ///
    /// Existing partitions are left as they are.
    pub fn create_partition_for_model(&self, persona_id: &str, model: &str) -> Result<KbPartition> {
        let conn = self.storage.connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO kb_partitions (persona_id, embedding_model, dimension, created_at)
            VALUES (?1, ?2, NULL, ?3)",
            params![persona_id, model, Utc::now().to_rfc3339()],
        )
        .context("Failed to create knowledge base partition")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        read_partition(&conn, persona_id)?.ok_or_else(|| {
            RagPersonaError::Storage(format!("Partition for '{}' was not created", persona_id))
                .into()
        })
    }

    /// Read the partition record of a persona
    pub fn partition(&self, persona_id: &str) -> Result<Option<KbPartition>> {
        let conn = self.storage.connection()?;
        read_partition(&conn, persona_id)
    }

    /// Embed `chunks` and make them the complete chunk set of `source_id`
    ///
    /// Returns the number of chunks stored. A missing partition is recreated
    /// with the default embedding model.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMismatch` if no embedder for the partition's
    /// model is available or the vector dimension changed, and
    /// `IngestionFailure` if embedding or storing fails. In every error case
    /// the source's previous chunks remain.
    pub async fn upsert(&self, persona_id: &str, source_id: &str, chunks: &[String]) -> Result<usize> {
        self.upsert_with(persona_id, source_id, chunks, |_, _| Ok(())).await
    }

    /// [`upsert`](Self::upsert) that also runs `record` inside the replacing
    /// transaction, with the number of chunks stored
    ///
    /// If `record` fails the whole replacement is rolled back.
    pub async fn upsert_with<F>(
        &self,
        persona_id: &str,
        source_id: &str,
        chunks: &[String],
        record: F,
    ) -> Result<usize>
    where
        F: FnOnce(&Transaction<'_>, usize) -> Result<()> + Send,
    {
        let partition = match self.partition(persona_id)? {
            Some(partition) => partition,
            None => {
                tracing::warn!(persona_id, "Knowledge base partition missing, recreating it");
                self.create_partition(persona_id)?
            }
        };
        let embedder = self.embedder_for(&partition)?;

        let vectors = embedder.embed(chunks).await.map_err(|e| {
            let message = e.to_string();
            e.context(RagPersonaError::IngestionFailure {
                source_label: source_id.to_string(),
                message,
            })
        })?;

        let dimension = validate_embeddings(chunks.len(), &vectors).map_err(|e| {
            RagPersonaError::IngestionFailure {
                source_label: source_id.to_string(),
                message: e.to_string(),
            }
        })?;
        if !chunks.is_empty() {
            check_dimension(&partition, embedder.model_id(), dimension)?;
        }

        let mut conn = self.storage.connection()?;
        replace_source(&mut conn, persona_id, source_id, chunks, &vectors, dimension, record)
            .map_err(|e| RagPersonaError::IngestionFailure {
                source_label: source_id.to_string(),
                message: e.to_string(),
            })?;

        tracing::info!(
            persona_id,
            source_id,
            chunks = chunks.len(),
            "Indexed source"
        );
        Ok(chunks.len())
    }

    /// Remove every chunk of one source. Removing an unknown source is a no-op.
    pub fn delete_source(&self, persona_id: &str, source_id: &str) -> Result<usize> {
        let conn = self.storage.connection()?;
        let removed = conn
            .execute(
                "DELETE FROM chunks WHERE persona_id = ?1 AND source_id = ?2",
                params![persona_id, source_id],
            )
            .context("Failed to delete source chunks")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        tracing::debug!(persona_id, source_id, removed, "Deleted source chunks");
        Ok(removed)
    }

    /// Remove a persona's whole partition. Removing an unknown persona is a no-op.
    pub fn delete_persona(&self, persona_id: &str) -> Result<()> {
        let mut conn = self.storage.connection()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        tx.execute("DELETE FROM chunks WHERE persona_id = ?", params![persona_id])
            .context("Failed to delete chunks")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
        tx.execute(
            "DELETE FROM kb_partitions WHERE persona_id = ?",
            params![persona_id],
        )
        .context("Failed to delete partition")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        tracing::debug!(persona_id, "Deleted knowledge base partition");
        Ok(())
    }

    /// The `k` chunks of a persona most similar to `query`
    ///
    /// Ordered by descending score, ties broken by ascending position, then
    /// source and id. An empty or missing knowledge base yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `k` is zero and `ConfigurationMismatch` if
    /// the partition's embedding model cannot be used for the query.
    pub async fn query_top_k(&self, persona_id: &str, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(RagPersonaError::InvalidInput("k must be at least 1".to_string()).into());
        }

        let partition = match self.partition(persona_id) {
            Ok(Some(partition)) => partition,
            Ok(None) => {
                tracing::warn!(persona_id, "Knowledge base missing, retrieving nothing");
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::warn!(persona_id, "Knowledge base unreadable, retrieving nothing: {}", e);
                return Ok(Vec::new());
            }
        };
        let embedder = self.embedder_for(&partition)?;

        let chunks = self.load_chunks(persona_id)?;
        if chunks.is_empty() {
            tracing::debug!(persona_id, "Knowledge base empty");
            return Ok(Vec::new());
        }

        let query_vector = embedder.embed_one(query).await?;
        check_dimension(&partition, embedder.model_id(), query_vector.len())?;

        let mut scored: Vec<ScoredChunk> = chunks
            .into_iter()
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(&query_vector, &chunk.vector),
                chunk,
            })
            .collect();

        scored.sort_by(rank);
        scored.truncate(k);

        tracing::debug!(persona_id, k, returned = scored.len(), "Retrieved chunks");
        Ok(scored)
    }

    /// All chunks of a persona in source/position order
    pub fn load_chunks(&self, persona_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.storage.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, source_id, position, text, vector FROM chunks
                WHERE persona_id = ?
                ORDER BY source_id, position",
            )
            .context("Failed to prepare statement")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![persona_id], |row| {
                let position: i64 = row.get(2)?;
                let blob: Vec<u8> = row.get(4)?;
                Ok(Chunk {
                    id: row.get(0)?,
                    persona_id: persona_id.to_string(),
                    source_id: row.get(1)?,
                    position: position.max(0) as usize,
                    text: row.get(3)?,
                    vector: blob_to_vec(&blob),
                })
            })
            .context("Failed to query chunks")
            .map_err(|e| RagPersonaError::Storage(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read chunk row")
            .map_err(|e| RagPersonaError::Storage(e.to_string()).into())
    }

    /// Number of chunks stored for a persona
    pub fn chunk_count(&self, persona_id: &str) -> Result<usize> {
        let conn = self.storage.connection()?;
        count_chunks(&conn, persona_id)
    }

    /// Health of a persona's knowledge base
    ///
    /// Never fails: a partition that cannot be read is reported as `MissingKb`.
    pub fn status(&self, persona_id: &str) -> KbStatus {
        let read_status = || -> Result<KbStatus> {
            let conn = self.storage.connection()?;
            if read_partition(&conn, persona_id)?.is_none() {
                return Ok(KbStatus::MissingKb);
            }
            Ok(if count_chunks(&conn, persona_id)? > 0 {
                KbStatus::Active
            } else {
                KbStatus::Empty
            })
        };

        read_status().unwrap_or_else(|e| {
            tracing::warn!(persona_id, "Knowledge base unreadable: {}", e);
            KbStatus::MissingKb
        })
    }

    /// Embedder for the model a partition was built with
    fn embedder_for(&self, partition: &KbPartition) -> Result<Arc<dyn Embedder>> {
        if partition.embedding_model == self.embedder.model_id() {
            return Ok(Arc::clone(&self.embedder));
        }

        let mismatch = |actual: &str| -> anyhow::Error {
            RagPersonaError::ConfigurationMismatch {
                persona: partition.persona_id.clone(),
                expected: partition.embedding_model.clone(),
                actual: actual.to_string(),
            }
            .into()
        };

        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| mismatch(self.embedder.model_id()))?;
        let embedder = factory(&partition.embedding_model)?;
        if embedder.model_id() != partition.embedding_model {
            return Err(mismatch(embedder.model_id()));
        }

        tracing::debug!(
            persona_id = %partition.persona_id,
            model = %partition.embedding_model,
            "Using persona embedding model"
        );
        Ok(embedder)
    }
}

fn check_dimension(partition: &KbPartition, model: &str, dimension: usize) -> Result<()> {
    match partition.dimension {
        Some(expected) if expected != dimension => Err(RagPersonaError::ConfigurationMismatch {
            persona: partition.persona_id.clone(),
            expected: format!("{} ({} dimensions)", partition.embedding_model, expected),
            actual: format!("{} ({} dimensions)", model, dimension),
        }
        .into()),
        _ => Ok(()),
    }
}

/// Descending score, then ascending position, source and id
///
/// A total order: NaN scores sort after every number.
fn rank(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    a.score
        .is_nan()
        .cmp(&b.score.is_nan())
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.chunk.position.cmp(&b.chunk.position))
        .then_with(|| a.chunk.source_id.cmp(&b.chunk.source_id))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

fn replace_source<F>(
    conn: &mut Connection,
    persona_id: &str,
    source_id: &str,
    chunks: &[String],
    vectors: &[Vec<f32>],
    dimension: usize,
    record: F,
) -> Result<()>
where
    F: FnOnce(&Transaction<'_>, usize) -> Result<()>,
{
    let tx = conn
        .transaction()
        .context("Failed to start transaction")?;

    tx.execute(
        "DELETE FROM chunks WHERE persona_id = ?1 AND source_id = ?2",
        params![persona_id, source_id],
    )
    .context("Failed to delete previous chunks")?;

    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO chunks (id, persona_id, source_id, position, text, vector)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .context("Failed to prepare insert")?;

        for (position, (text, vector)) in chunks.iter().zip(vectors).enumerate() {
            stmt.execute(params![
                chunk_id(persona_id, source_id, position),
                persona_id,
                source_id,
                position as i64,
                text,
                vec_to_blob(vector),
            ])
            .context("Failed to insert chunk")?;
        }
    }

    if !chunks.is_empty() {
        tx.execute(
            "UPDATE kb_partitions SET dimension = ?1 WHERE persona_id = ?2 AND dimension IS NULL",
            params![dimension as i64, persona_id],
        )
        .context("Failed to record vector dimension")?;
    }

    record(&tx, chunks.len())?;

    tx.commit().context("Failed to commit transaction")?;
    Ok(())
}

fn read_partition(conn: &Connection, persona_id: &str) -> Result<Option<KbPartition>> {
    conn.query_row(
        "SELECT embedding_model, dimension, created_at FROM kb_partitions WHERE persona_id = ?",
        params![persona_id],
        |row| {
            let dimension: Option<i64> = row.get(1)?;
            let created_at: String = row.get(2)?;
            Ok(KbPartition {
                persona_id: persona_id.to_string(),
                embedding_model: row.get(0)?,
                dimension: dimension.map(|d| d.max(0) as usize),
                created_at: parse_timestamp(&created_at),
            })
        },
    )
    .optional()
    .context("Failed to read knowledge base partition")
    .map_err(|e| RagPersonaError::Storage(e.to_string()).into())
}

fn count_chunks(conn: &Connection, persona_id: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT count(*) FROM chunks WHERE persona_id = ?",
            params![persona_id],
            |row| row.get(0),
        )
        .context("Failed to count chunks")
        .map_err(|e| RagPersonaError::Storage(e.to_string()))?;
    Ok(count.max(0) as usize)
}
