//! Ollama connection check
//!
//! Verifies that the configured Ollama server is reachable, lists the
//! installed models and flags whether the configured chat and embedding
//! models are among them.

use crate::config::Config;
use crate::error::Result;
use crate::providers::{ModelInfo, OllamaProvider, Provider};
use colored::Colorize;
use prettytable::{row, Table};

/// Check the Ollama connection and print the installed models
///
/// # Errors
///
/// Returns `InferenceUnavailable` if the server cannot be reached, after
/// printing installation hints.
pub async fn check_ollama(config: &Config) -> Result<()> {
    let provider = OllamaProvider::new(&config.ollama)?;

    if let Err(e) = provider.health_check().await {
        eprintln!("{} {}", "✗".red(), e.to_string().red());
        eprintln!();
        eprintln!("To use Ollama:");
        eprintln!("  1. Install Ollama from https://ollama.com");
        eprintln!("  2. Run 'ollama serve' in a terminal");
        eprintln!(
            "  3. Pull the models: 'ollama pull {}' and 'ollama pull {}'",
            config.ollama.model, config.ollama.embedding_model
        );
        return Err(e);
    }
    println!(
        "{} {}",
        "✓".green(),
        format!("Connected to Ollama at {}", provider.host()).green()
    );

    let models = provider.list_models().await?;
    if models.is_empty() {
        println!(
            "{}",
            "No models available. Pull a model with: ollama pull <model>".yellow()
        );
    } else {
        output_models_table(&models);
    }

    for (role, name) in [
        ("Chat model", config.ollama.model.as_str()),
        ("Embedding model", config.ollama.embedding_model.as_str()),
    ] {
        if model_installed(&models, name) {
            println!("{}: {} {}", role, name.cyan(), "(installed)".green());
        } else {
            println!(
                "{}: {} {} run 'ollama pull {}'",
                role,
                name.cyan(),
                "(missing)".yellow(),
                name
            );
        }
    }

    Ok(())
}

/// Whether `name` is installed, treating a bare name as its `:latest` tag
pub fn model_installed(models: &[ModelInfo], name: &str) -> bool {
    models.iter().any(|m| {
        m.name == name || (!name.contains(':') && m.name == format!("{}:latest", name))
    })
}

fn output_models_table(models: &[ModelInfo]) {
    let mut table = Table::new();
    table.add_row(row!["Name", "Size", "Modified"]);

    for model in models {
        let modified = model.modified_at.get(..10).unwrap_or(&model.modified_at);
        table.add_row(row![model.name, model.size, modified]);
    }

    println!("\nAvailable models:\n");
    table.printstd();
    println!();
}
