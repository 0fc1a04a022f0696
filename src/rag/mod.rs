//! Retrieval-augmented generation pipeline
//!
//! Chunking, persona-partitioned vector indexing and similarity retrieval.

pub mod chunker;
pub mod index;
pub mod retriever;
pub mod types;
pub mod vector;

pub use chunker::chunk;
pub use index::{EmbedderFactory, EmbeddingIndex};
pub use retriever::{RetrievedChunk, Retriever};
pub use types::{chunk_id, Chunk, KbPartition, KbStatus, ScoredChunk};
