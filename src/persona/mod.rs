//! Persona metadata and lifecycle

pub mod store;
pub mod types;

pub use store::PersonaStore;
pub use types::{persona_key, validate_name, Persona, PersonaSummary, TranscriptSource};
