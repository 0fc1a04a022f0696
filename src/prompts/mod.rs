//! Prompt templates
//!
//! This module renders the single prompt sent to the inference provider for
//! each chat message.

pub mod persona_prompt;

pub use persona_prompt::{build_persona_prompt, PromptParts};
