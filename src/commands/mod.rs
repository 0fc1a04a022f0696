/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `personas` — create, inspect, feed and delete personas
- `chat`     — interactive chat with a persona
- `models`   — Ollama connection check
- `sessions` — saved chat sessions

Handlers are thin: they wire configuration into the library components
(persona store, conversation engine, providers) and format the results.
*/

use crate::config::Config;
use crate::error::Result;
use crate::persona::PersonaStore;
use crate::providers::{create_embedder, create_embedder_for};
use crate::rag::{EmbedderFactory, EmbeddingIndex};
use crate::storage::SqliteStorage;
use std::sync::Arc;

// Model management commands
pub mod models;

// Saved chat sessions
pub mod sessions;

// Special commands parser for the chat loop
pub mod special_commands;

/// Open the persona store described by `config`
///
/// New personas are built with `config.ollama.embedding_model`; existing
/// personas keep embedding with the model they were built with. Nothing is
/// sent to Ollama until a source is ingested or a question is asked.
pub fn open_store(config: &Config) -> Result<Arc<PersonaStore>> {
    let storage = SqliteStorage::new_with_path(config.storage.database_path()?)?;
    tracing::debug!("Using database at {}", storage.db_path().display());

    let embedder = create_embedder(&config.ollama)?;
    let ollama = config.ollama.clone();
    let factory: EmbedderFactory =
        Arc::new(move |model: &str| create_embedder_for(&ollama, model));
    let index = Arc::new(
        EmbeddingIndex::new(storage.clone(), embedder).with_embedder_factory(factory),
    );
    Ok(Arc::new(PersonaStore::new(
        storage,
        index,
        config.rag.clone(),
    )))
}

/// Ask a yes/no question on the terminal; anything but y/yes is a no
fn confirm(question: &str) -> Result<bool> {
    use rustyline::error::ReadlineError;

    let mut rl = rustyline::DefaultEditor::new()?;
    match rl.readline(&format!("{} [y/N] ", question)) {
        Ok(answer) => Ok(matches!(
            answer.trim().to_lowercase().as_str(),
            "y" | "yes"
        )),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

// Persona management command handlers
pub mod personas {
    //! Persona management handlers.
    //!
    //! Each handler maps one CLI command onto the [`PersonaStore`] and prints
    //! a short human-readable report.

    use super::*;
    use crate::persona::Persona;
    use crate::rag::KbStatus;
    use crate::transcript::TranscriptFetcher;
    use colored::{ColoredString, Colorize};
    use prettytable::{format, row, Table};
    use std::path::{Path, PathBuf};

    /// Create a persona and ingest any transcripts given with it
    ///
    /// Every transcript is attempted; the persona is kept even if some fail,
    /// and the first failure is returned after the rest were processed.
    pub async fn create_persona(
        store: &PersonaStore,
        fetcher: &dyn TranscriptFetcher,
        name: &str,
        description: &str,
        transcripts: &[PathBuf],
    ) -> Result<()> {
        let persona = store.create(name, description)?;
        println!(
            "{}",
            format!("Created persona '{}'", persona.name).green().bold()
        );

        if transcripts.is_empty() {
            println!(
                "{}",
                "No transcripts provided. Add some with 'ragpersona add-transcript'.".yellow()
            );
            return Ok(());
        }

        let mut first_error = None;
        for path in transcripts {
            if let Err(e) = ingest_file(store, fetcher, &persona.name, path, None).await {
                eprintln!(
                    "{}",
                    format!("Failed to ingest {}: {}", path.display(), e).red()
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Ingest one transcript file into an existing persona
    pub async fn add_transcript(
        store: &PersonaStore,
        fetcher: &dyn TranscriptFetcher,
        persona: &str,
        path: &Path,
        source_name: Option<&str>,
    ) -> Result<()> {
        let persona = store.get(persona)?;
        ingest_file(store, fetcher, &persona.name, path, source_name).await
    }

    async fn ingest_file(
        store: &PersonaStore,
        fetcher: &dyn TranscriptFetcher,
        persona: &str,
        path: &Path,
        source_name: Option<&str>,
    ) -> Result<()> {
        let transcript = fetcher.fetch(&path.to_string_lossy()).await?;
        let label = source_name.unwrap_or(&transcript.label);

        let source = store
            .add_source(persona, &transcript.text, label, &transcript.origin)
            .await?;
        println!(
            "{} {} chunks from '{}'",
            "Added".green(),
            source.chunk_count,
            source.label.cyan()
        );
        Ok(())
    }

    /// Remove one source from a persona
    pub fn remove_source(store: &PersonaStore, persona: &str, source: &str) -> Result<()> {
        store.remove_source(persona, source)?;
        println!("{}", format!("Removed source '{}'", source).green());
        Ok(())
    }

    /// Print a table of all personas
    pub fn list_personas(store: &PersonaStore) -> Result<()> {
        let personas = store.list()?;

        if personas.is_empty() {
            println!("{}", "No personas found.".yellow());
            println!(
                "Create one with {}",
                "ragpersona create-persona <NAME> --transcript <FILE>".cyan()
            );
            return Ok(());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(row![
            "Name".bold(),
            "Status".bold(),
            "Sources".bold(),
            "Chunks".bold(),
            "Description".bold()
        ]);

        for persona in personas {
            table.add_row(row![
                persona.name.cyan(),
                status_label(persona.status),
                persona.source_count,
                persona.chunk_count,
                crate::text_utils::truncate_text(&persona.description, 40)
            ]);
        }

        println!("\nPersonas:");
        table.printstd();
        println!();
        Ok(())
    }

    /// Print details about one persona
    pub fn show_info(store: &PersonaStore, name: &str) -> Result<()> {
        let persona = store.get(name)?;
        let status = store.status(&persona);
        let chunks = store.index().chunk_count(&persona.id).unwrap_or(0);

        println!("\n{}", persona.name.bold().cyan());
        if !persona.description.is_empty() {
            println!("{}", persona.description);
        }
        println!();
        println!("Status:          {}", status_label(status));
        println!("Embedding model: {}", persona.embedding_model);
        println!("Chunks:          {}", chunks);
        println!(
            "Created:         {}",
            persona.created_at.format("%Y-%m-%d %H:%M")
        );
        println!(
            "Last chat:       {}",
            persona
                .last_interaction
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string())
        );

        print_sources(&persona);
        Ok(())
    }

    fn print_sources(persona: &Persona) {
        if persona.sources.is_empty() {
            println!("Sources:         none\n");
            return;
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_CLEAN);
        table.add_row(row!["Source".bold(), "Chunks".bold(), "Ingested".bold(), "Origin".bold()]);
        for source in &persona.sources {
            table.add_row(row![
                source.label,
                source.chunk_count,
                source.ingested_at.format("%Y-%m-%d %H:%M"),
                source.origin
            ]);
        }

        println!("\nSources:");
        table.printstd();
        println!();
    }

    /// Delete a persona, asking for confirmation unless `force` is set
    pub fn delete_persona(store: &PersonaStore, name: &str, force: bool) -> Result<()> {
        let persona = store.get(name)?;

        if !force
            && !confirm(&format!(
                "Delete persona '{}' and its knowledge base?",
                persona.name
            ))?
        {
            println!("{}", "Cancelled.".yellow());
            return Ok(());
        }

        store.delete(&persona.name)?;
        println!(
            "{}",
            format!("Deleted persona '{}'", persona.name).green()
        );
        Ok(())
    }

    fn status_label(status: KbStatus) -> ColoredString {
        let label = status.to_string();
        match status {
            KbStatus::Active => label.green(),
            KbStatus::Empty => label.yellow(),
            KbStatus::MissingKb => label.red(),
        }
    }

}

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Runs a readline loop that sends each message to the
    //! [`ConversationEngine`](crate::engine::ConversationEngine) and streams the
    //! reply to stdout. Ctrl-C while a reply is streaming stops that reply;
    //! Ctrl-C at the prompt only reminds the user how to leave.

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use crate::conversation::{ChatHistory, Role, TurnStatus};
    use crate::engine::ConversationEngine;
    use crate::error::RagPersonaError;
    use crate::persona::Persona;
    use crate::providers::create_provider;
    use crate::rag::KbStatus;
    use crate::text_utils::{format_duration, truncate_text};
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use std::time::Instant;
    use tokio_util::sync::CancellationToken;

    /// Start interactive chat with a persona
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `persona_name` - Persona to talk to
    /// * `model` - Optional override for the chat model
    /// * `clear_history` - Discard the saved session first
    /// * `resume` - Load the saved session and save it again on exit
    pub async fn run_chat(
        mut config: Config,
        persona_name: &str,
        model: Option<String>,
        clear_history: bool,
        resume: bool,
    ) -> Result<()> {
        if let Some(model) = model {
            config.ollama.model = model;
        }

        let store = open_store(&config)?;
        let persona = store.get(persona_name)?;
        let storage = store.storage().clone();

        let provider = create_provider(&config.ollama)?;
        provider.health_check().await?;
        let engine = ConversationEngine::new(provider, Arc::clone(&store), &config);

        if clear_history && storage.delete_session(&persona.id)? {
            println!("{}", "Saved session cleared.".yellow());
        }
        let mut history = if resume {
            match storage.load_session(&persona.id)? {
                Some(turns) => ChatHistory::from_turns(turns),
                None => ChatHistory::new(),
            }
        } else {
            ChatHistory::new()
        };

        print_welcome_banner(&persona, engine.model(), store.status(&persona), history.len());

        let started = Instant::now();
        let mut rl = DefaultEditor::new()?;
        let prompt = format!("{} ", "You >".bold().green());

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::None) => {}
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::Help) => {
                            print_help();
                            continue;
                        }
                        Ok(SpecialCommand::Clear) => {
                            history.clear();
                            println!("{}\n", "Conversation cleared.".yellow());
                            continue;
                        }
                        Ok(SpecialCommand::ShowHistory) => {
                            print_history(&history, &persona);
                            continue;
                        }
                        Ok(SpecialCommand::ShowStatus) => {
                            print_status(&store, &persona, &engine, &history, started);
                            continue;
                        }
                        Ok(SpecialCommand::Save) => {
                            storage.save_session(&persona.id, history.turns())?;
                            println!(
                                "{}\n",
                                format!("Saved {} turns.", history.len()).green()
                            );
                            continue;
                        }
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    }

                    ask(&engine, &persona, trimmed, &mut history).await;
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "Type /exit or press Ctrl-D to leave.".yellow());
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        if resume {
            storage.save_session(&persona.id, history.turns())?;
            println!("{}", "Session saved.".green());
        }
        println!("Goodbye!");
        Ok(())
    }

    /// Send one message and stream the reply; errors are reported, not returned
    async fn ask(
        engine: &ConversationEngine,
        persona: &Persona,
        message: &str,
        history: &mut ChatHistory,
    ) {
        let token = CancellationToken::new();
        let watcher = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            })
        };

        print!("\n{} ", format!("{} >", persona.name).bold().cyan());
        let _ = std::io::stdout().flush();

        let result = engine
            .respond(persona, message, history, &token, |fragment| {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            })
            .await;
        watcher.abort();

        match result {
            Ok(reply) => {
                println!();
                if reply.status == TurnStatus::Incomplete {
                    println!("{}", "[response ended early]".yellow());
                }
                println!();
            }
            Err(e) => {
                println!();
                match e.downcast_ref::<RagPersonaError>() {
                    Some(RagPersonaError::CancelledGeneration) => {
                        println!("{}\n", "[interrupted]".yellow());
                    }
                    Some(RagPersonaError::ModelNotFound(_)) => {
                        eprintln!("{}", e.to_string().red());
                        eprintln!(
                            "{}\n",
                            "Check installed models with 'ragpersona check-ollama'.".yellow()
                        );
                    }
                    _ => eprintln!("{}\n", format!("Error: {}", e).red()),
                }
            }
        }
    }

    fn print_welcome_banner(persona: &Persona, model: &str, status: KbStatus, turns: usize) {
        println!("\n{}", format!("Chatting with {}", persona.name).bold().cyan());
        if !persona.description.is_empty() {
            println!("{}", persona.description.dimmed());
        }
        println!("Model: {}", model);

        match status {
            KbStatus::Active => {}
            KbStatus::Empty => println!(
                "{}",
                "This persona has no transcripts yet; answers will not be grounded.".yellow()
            ),
            KbStatus::MissingKb => println!(
                "{}",
                "Knowledge base missing; answers will not be grounded.".red()
            ),
        }
        if turns > 0 {
            println!("Resumed {} earlier turns.", turns);
        }
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    fn print_history(history: &ChatHistory, persona: &Persona) {
        if history.is_empty() {
            println!("{}\n", "No messages yet.".yellow());
            return;
        }

        println!();
        for turn in history.turns() {
            let speaker = match turn.role {
                Role::User => "You".green().bold(),
                Role::Assistant => persona.name.cyan().bold(),
            };
            let marker = match turn.status {
                TurnStatus::Complete => String::new(),
                TurnStatus::Incomplete => " [interrupted]".yellow().to_string(),
                TurnStatus::Failed => " [failed]".red().to_string(),
            };
            println!("{}: {}{}", speaker, truncate_text(&turn.content, 100), marker);
        }
        println!();
    }

    fn print_status(
        store: &PersonaStore,
        persona: &Persona,
        engine: &ConversationEngine,
        history: &ChatHistory,
        started: Instant,
    ) {
        let chunks = store.index().chunk_count(&persona.id).unwrap_or(0);
        println!("\nPersona:         {}", persona.name.cyan());
        println!("Knowledge base:  {} ({} chunks)", store.status(persona), chunks);
        println!("Sources:         {}", persona.sources.len());
        println!("Chat model:      {}", engine.model());
        println!("Embedding model: {}", persona.embedding_model);
        println!("Turns:           {}", history.len());
        println!(
            "Session time:    {}\n",
            format_duration(started.elapsed().as_secs())
        );
    }
}
