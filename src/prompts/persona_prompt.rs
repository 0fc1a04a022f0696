//! Persona prompt
//!
//! The prompt has four parts, in order: an identity preamble with the
//! persona's name and description, an optional context block of retrieved
//! transcript excerpts, the recent conversation, and the new user message.

use crate::conversation::Turn;
use crate::persona::Persona;
use crate::rag::RetrievedChunk;
use crate::text_utils::truncate_text;

/// Separator between context entries
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Inputs of one prompt
#[derive(Debug, Clone, Copy)]
pub struct PromptParts<'a> {
    pub persona: &'a Persona,
    /// Retrieved chunks, highest score first
    pub context: &'a [RetrievedChunk],
    /// History window, oldest first
    pub history: &'a [Turn],
    pub user_message: &'a str,
    /// Longest excerpt allowed in the context block, in characters
    pub max_chunk_chars: usize,
}

/// Renders the prompt for one user message
///
/// When nothing was retrieved the context block is left out entirely, so the
/// prompt falls back to plain in-character chat.
///
/// # Examples
///
/// ```
/// use ragpersona::persona::Persona;
/// use ragpersona::prompts::{build_persona_prompt, PromptParts};
///
/// let persona = Persona::new("Rick", "A mad scientist", "all-minilm").unwrap();
/// let prompt = build_persona_prompt(&PromptParts {
///     persona: &persona,
///     context: &[],
///     history: &[],
///     user_message: "Who are you?",
///     max_chunk_chars: 1000,
/// });
/// assert!(prompt.starts_with("You are Rick."));
/// assert!(!prompt.contains("Context:"));
/// ```
pub fn build_persona_prompt(parts: &PromptParts<'_>) -> String {
    let name = &parts.persona.name;
    let mut sections = vec![identity_preamble(parts.persona)];

    if !parts.context.is_empty() {
        let entries: Vec<String> = parts
            .context
            .iter()
            .map(|c| {
                format!(
                    "[Source: {}]\n{}",
                    c.source_label,
                    truncate_text(c.text.trim(), parts.max_chunk_chars)
                )
            })
            .collect();
        sections.push(format!(
            "Context from {}'s transcripts:\n\n{}",
            name,
            entries.join(CONTEXT_SEPARATOR)
        ));
    }

    if !parts.history.is_empty() {
        let lines: Vec<String> = parts.history.iter().map(Turn::render).collect();
        sections.push(format!("Previous conversation:\n{}", lines.join("\n")));
    }

    sections.push(format!("User: {}", parts.user_message.trim()));
    sections.push(format!(
        "Remember: You are {}. Answer in their voice and style using the provided context.",
        name
    ));

    sections.join("\n\n")
}

fn identity_preamble(persona: &Persona) -> String {
    let name = &persona.name;
    let mut preamble = format!("You are {}.", name);
    if !persona.description.is_empty() {
        preamble.push_str("\n\n");
        preamble.push_str(&persona.description);
    }
    preamble.push_str(&format!(
        r#"

IMPORTANT INSTRUCTIONS:
1. Respond AS {name}, using their knowledge, perspective, and communication style.
2. Use the provided context to answer questions about {name}'s expertise.
3. If asked about something not in the context, be honest that you don't have that information.
4. Stay in character as {name} at all times."#
    ));
    preamble
}
