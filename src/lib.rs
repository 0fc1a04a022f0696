//! RagPersona - chat with personas grounded in their own transcripts
//!
//! This library builds a small per-persona knowledge base from transcript
//! text and uses retrieved context to ground replies from a local language
//! model.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `rag`: chunking, persona-partitioned embedding index and retrieval
//! - `persona`: persona metadata and the store tying it to the index
//! - `engine`: prompt assembly, streaming inference and history updates
//! - `conversation`: chat turns and the sliding history window
//! - `providers`: inference and embedding abstractions (Ollama)
//! - `transcript`: transcript files and subtitle normalisation
//! - `storage`: SQLite schema and saved chat sessions
//! - `config`: configuration management and validation
//! - `error`: error types, result alias and exit-code classes
//! - `cli` / `commands`: command-line interface and handlers
//!
//! # Example
//!
//! ```no_run
//! use ragpersona::{commands, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let store = commands::open_store(&config)?;
//!     for persona in store.list()? {
//!         println!("{} ({})", persona.name, persona.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod persona;
pub mod prompts;
pub mod providers;
pub mod rag;
pub mod storage;
pub mod text_utils;
pub mod transcript;

// Re-export commonly used types
pub use config::Config;
pub use conversation::{ChatHistory, Turn, TurnStatus};
pub use engine::{ConversationEngine, Reply};
pub use error::{RagPersonaError, Result};
pub use persona::{Persona, PersonaStore};

#[cfg(test)]
pub mod test_utils;
