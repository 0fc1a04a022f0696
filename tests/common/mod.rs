use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use ragpersona::config::RagConfig;
use ragpersona::error::Result;
use ragpersona::persona::PersonaStore;
use ragpersona::providers::Embedder;
use ragpersona::rag::{EmbedderFactory, EmbeddingIndex};
use ragpersona::storage::SqliteStorage;

/// Deterministic bag-of-words embedder: each lowercase word bumps one bucket
#[allow(dead_code)]
pub struct WordEmbedder {
    model: String,
}

#[allow(dead_code)]
impl WordEmbedder {
    pub const DIMENSION: usize = 32;

    pub fn new() -> Self {
        Self::with_model("word-embed")
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; Self::DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(5381u64, |h, b| h.wrapping_mul(33) ^ b as u64);
            vector[(hash % Self::DIMENSION as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for WordEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

#[allow(dead_code)]
pub fn rag_config(chunk_size: usize, chunk_overlap: usize) -> RagConfig {
    RagConfig {
        chunk_size,
        chunk_overlap,
        top_k: 5,
    }
}

/// Persona store over a fresh database in a temp directory
#[allow(dead_code)]
pub fn create_store(embedder: Arc<dyn Embedder>, rag: RagConfig) -> (PersonaStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = open_store_in(&tmp, embedder, rag);
    (store, tmp)
}

/// Persona store over the database inside an existing directory
#[allow(dead_code)]
pub fn open_store_in(dir: &TempDir, embedder: Arc<dyn Embedder>, rag: RagConfig) -> PersonaStore {
    let storage = SqliteStorage::new(dir.path()).expect("failed to create sqlite storage");
    let index = Arc::new(EmbeddingIndex::new(storage.clone(), embedder));
    PersonaStore::new(storage, index, rag)
}

/// Persona store whose index resolves each persona's model to a [`WordEmbedder`]
#[allow(dead_code)]
pub fn open_store_with_factory(
    dir: &TempDir,
    embedder: Arc<dyn Embedder>,
    rag: RagConfig,
) -> PersonaStore {
    let storage = SqliteStorage::new(dir.path()).expect("failed to create sqlite storage");
    let factory: EmbedderFactory = Arc::new(|model: &str| {
        Ok(Arc::new(WordEmbedder::with_model(model)) as Arc<dyn Embedder>)
    });
    let index = EmbeddingIndex::new(storage.clone(), embedder).with_embedder_factory(factory);
    PersonaStore::new(storage, Arc::new(index), rag)
}

#[allow(dead_code)]
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("failed to write file");
    path
}
