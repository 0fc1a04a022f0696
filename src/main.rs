//! RagPersona - chat with personas grounded in their own transcripts
//!
#![doc = "Main entry point for the RagPersona CLI."]

use std::process::ExitCode;

use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragpersona::cli::{Cli, Commands};
use ragpersona::commands::{self, chat, models, personas, sessions};
use ragpersona::config::Config;
use ragpersona::error::{classify, Result};
use ragpersona::transcript::FileTranscriptFetcher;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::from(classify(&e).exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::CreatePersona {
            name,
            description,
            transcripts,
        } => {
            tracing::info!("Creating persona {}", name);
            let store = commands::open_store(&config)?;
            let fetcher = FileTranscriptFetcher::new()?;
            personas::create_persona(&store, &fetcher, &name, &description, &transcripts).await
        }
        Commands::AddTranscript {
            persona,
            path,
            source_name,
        } => {
            tracing::info!("Adding {} to {}", path.display(), persona);
            let store = commands::open_store(&config)?;
            let fetcher = FileTranscriptFetcher::new()?;
            personas::add_transcript(&store, &fetcher, &persona, &path, source_name.as_deref())
                .await
        }
        Commands::RemoveSource { persona, source } => {
            let store = commands::open_store(&config)?;
            personas::remove_source(&store, &persona, &source)
        }
        Commands::ListPersonas => {
            let store = commands::open_store(&config)?;
            personas::list_personas(&store)
        }
        Commands::Info { persona } => {
            let store = commands::open_store(&config)?;
            personas::show_info(&store, &persona)
        }
        Commands::DeletePersona { persona, force } => {
            let store = commands::open_store(&config)?;
            personas::delete_persona(&store, &persona, force)
        }
        Commands::Chat {
            persona,
            model,
            clear_history,
            resume,
        } => {
            tracing::info!("Starting interactive chat with {}", persona);
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }

            // Moves `config` into the handler (match arms are exclusive)
            chat::run_chat(config, &persona, model, clear_history, resume).await
        }
        Commands::CheckOllama => models::check_ollama(&config).await,
        Commands::Sessions { command } => {
            let store = commands::open_store(&config)?;
            sessions::handle_sessions(store.storage(), command)
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so streamed replies on stdout stay clean.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "ragpersona=debug"
    } else {
        "ragpersona=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
