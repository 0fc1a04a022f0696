//! Command-line interface definition for RagPersona
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for persona management, ingestion and chat.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// RagPersona - chat with personas grounded in their own transcripts
///
/// Builds a local knowledge base per persona from transcript files and
/// answers questions in the persona's voice using a local Ollama server.
#[derive(Parser, Debug, Clone)]
#[command(name = "ragpersona")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Directory holding the persona database
    #[arg(long, env = "RAGPERSONA_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for RagPersona
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a new persona, optionally ingesting transcripts
    CreatePersona {
        /// Persona name (unique, case-insensitive)
        name: String,

        /// Short description of who the persona is
        #[arg(short, long, default_value = "")]
        description: String,

        /// Transcript files to ingest right away
        #[arg(short, long = "transcript")]
        transcripts: Vec<PathBuf>,
    },

    /// Add a transcript to a persona's knowledge base
    AddTranscript {
        /// Persona name
        persona: String,

        /// Transcript file (.srt, .vtt, .json3 or plain text)
        path: PathBuf,

        /// Name for the source (defaults to the file name without extension)
        #[arg(long)]
        source_name: Option<String>,
    },

    /// Remove one source and its chunks from a persona
    RemoveSource {
        /// Persona name
        persona: String,

        /// Source label as shown by `info`
        source: String,
    },

    /// List all personas
    ListPersonas,

    /// Show details about a persona
    Info {
        /// Persona name
        persona: String,
    },

    /// Delete a persona and its knowledge base
    DeletePersona {
        /// Persona name
        persona: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Start an interactive chat with a persona
    Chat {
        /// Persona name
        persona: String,

        /// Override the chat model from config
        #[arg(short, long)]
        model: Option<String>,

        /// Discard the saved session before starting
        #[arg(long)]
        clear_history: bool,

        /// Continue the saved session and save it again on exit
        #[arg(short, long)]
        resume: bool,
    },

    /// Check the connection to Ollama and list installed models
    CheckOllama,

    /// Manage saved chat sessions
    Sessions {
        /// Session subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },
}

/// Saved chat session subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List saved sessions
    List,

    /// Delete the saved session of a persona
    Delete {
        /// Persona name
        persona: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
