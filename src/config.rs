//! Configuration management for RagPersona
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The resulting [`Config`] is passed explicitly to every component that
//! needs it; there is no process-wide settings singleton.

use crate::error::{Result, RagPersonaError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for RagPersona
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ollama connection and model settings
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Chunking and retrieval settings
    #[serde(default)]
    pub rag: RagConfig,
    /// Chat history windowing and inference retry settings
    #[serde(default)]
    pub conversation: ConversationConfig,
    /// Where personas and knowledge bases are stored
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model used for chat generation
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Model used for embeddings. Recorded per persona at creation time.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Context window requested from the model
    #[serde(default = "default_num_ctx")]
    pub num_ctx: usize,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_num_ctx() -> usize {
    4096
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            embedding_model: default_embedding_model(),
            request_timeout_seconds: default_request_timeout(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            num_ctx: default_num_ctx(),
        }
    }
}

/// Chunking and retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    5
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
        }
    }
}

/// Conversation management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Most recent turns included in the prompt
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Estimated token budget for the history tail of the prompt
    #[serde(default = "default_max_history_tokens")]
    pub max_history_tokens: usize,

    /// Delay before the single retry of a failed inference dispatch (ms)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Keep interrupted replies in history as incomplete turns.
    /// When false the interrupted reply text is dropped but the marker stays.
    #[serde(default = "default_persist_incomplete")]
    pub persist_incomplete: bool,
}

fn default_max_history_turns() -> usize {
    10
}

fn default_max_history_tokens() -> usize {
    2000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_persist_incomplete() -> bool {
    true
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            max_history_tokens: default_max_history_tokens(),
            retry_backoff_ms: default_retry_backoff_ms(),
            persist_incomplete: default_persist_incomplete(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory holding the persona database. Defaults to the platform
    /// data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the directory that holds `ragpersona.db`
    ///
    /// # Errors
    ///
    /// Returns error if no data directory is configured and the platform
    /// data directory cannot be determined
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }

        let proj_dirs = ProjectDirs::from("com", "ragpersona", "ragpersona").ok_or_else(|| {
            RagPersonaError::Storage("Could not determine data directory".to_string())
        })?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Full path of the SQLite database file
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("ragpersona.db"))
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagPersonaError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RagPersonaError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(host) = std::env::var("RAGPERSONA_OLLAMA_HOST") {
            self.ollama.host = host;
        }

        if let Ok(model) = std::env::var("RAGPERSONA_OLLAMA_MODEL") {
            self.ollama.model = model;
        }

        if let Ok(model) = std::env::var("RAGPERSONA_EMBEDDING_MODEL") {
            self.ollama.embedding_model = model;
        }

        if let Ok(dir) = std::env::var("RAGPERSONA_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }

        apply_usize_env("RAGPERSONA_CHUNK_SIZE", &mut self.rag.chunk_size);
        apply_usize_env("RAGPERSONA_CHUNK_OVERLAP", &mut self.rag.chunk_overlap);
        apply_usize_env("RAGPERSONA_TOP_K", &mut self.rag.top_k);
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(dir) = &cli.data_dir {
            tracing::debug!(data_dir = %dir.display(), "CLI override: --data-dir");
            self.storage.data_dir = Some(dir.clone());
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.ollama.host.trim().is_empty() {
            return Err(RagPersonaError::Config("ollama.host cannot be empty".to_string()).into());
        }

        if self.ollama.model.trim().is_empty() {
            return Err(
                RagPersonaError::Config("ollama.model cannot be empty".to_string()).into(),
            );
        }

        if self.ollama.embedding_model.trim().is_empty() {
            return Err(RagPersonaError::Config(
                "ollama.embedding_model cannot be empty".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.ollama.temperature) {
            return Err(RagPersonaError::Config(
                "ollama.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.rag.chunk_size == 0 {
            return Err(RagPersonaError::Config(
                "rag.chunk_size must be greater than 0".to_string(),
            )
            .into());
        }

        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(RagPersonaError::Config(format!(
                "rag.chunk_overlap ({}) must be less than rag.chunk_size ({})",
                self.rag.chunk_overlap, self.rag.chunk_size
            ))
            .into());
        }

        if self.rag.top_k == 0 {
            return Err(
                RagPersonaError::Config("rag.top_k must be greater than 0".to_string()).into(),
            );
        }

        if self.conversation.max_history_turns == 0 {
            return Err(RagPersonaError::Config(
                "conversation.max_history_turns must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn apply_usize_env(var: &str, target: &mut usize) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<usize>() {
            Ok(value) => {
                *target = value;
                tracing::debug!(value, "Env override: {}", var);
            }
            Err(_) => tracing::warn!("Invalid {}: {}", var, raw),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            rag: RagConfig::default(),
            conversation: ConversationConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn bare_cli() -> crate::cli::Cli {
        crate::cli::Cli {
            config: None,
            verbose: false,
            json_logs: false,
            data_dir: None,
            command: crate::cli::Commands::ListPersonas,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ollama.host, "http://localhost:11434");
        assert_eq!(config.ollama.model, "llama3.2");
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 200);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.conversation.max_history_turns, 10);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_overlap_not_less_than_size() {
        let mut config = Config::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_chunk_size() {
        let mut config = Config::default();
        config.rag.chunk_size = 0;
        config.rag.chunk_overlap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_top_k() {
        let mut config = Config::default();
        config.rag.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_embedding_model() {
        let mut config = Config::default();
        config.ollama.embedding_model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_temperature_range() {
        let mut config = Config::default();
        config.ollama.temperature = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
ollama:
  host: http://gpu-box:11434
  model: mistral
  embedding_model: nomic-embed-text
rag:
  chunk_size: 500
  chunk_overlap: 50
  top_k: 3
conversation:
  max_history_turns: 4
storage:
  data_dir: /tmp/ragpersona-test
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ollama.host, "http://gpu-box:11434");
        assert_eq!(config.ollama.embedding_model, "nomic-embed-text");
        assert_eq!(config.ollama.temperature, 0.7);
        assert_eq!(config.rag.chunk_size, 500);
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.conversation.max_history_turns, 4);
        assert_eq!(config.conversation.max_history_tokens, 2000);
        assert_eq!(
            config.storage.data_dir,
            Some(PathBuf::from("/tmp/ragpersona-test"))
        );
    }

    #[test]
    fn test_empty_yaml_uses_section_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.rag.chunk_size, 1000);
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = Config::load("nonexistent.yaml", &bare_cli()).unwrap();
        assert_eq!(config.ollama.model, "llama3.2");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("RAGPERSONA_CHUNK_SIZE", "300");
        std::env::set_var("RAGPERSONA_TOP_K", "not-a-number");
        std::env::set_var("RAGPERSONA_EMBEDDING_MODEL", "mxbai-embed-large");

        let config = Config::load("nonexistent.yaml", &bare_cli()).unwrap();

        std::env::remove_var("RAGPERSONA_CHUNK_SIZE");
        std::env::remove_var("RAGPERSONA_TOP_K");
        std::env::remove_var("RAGPERSONA_EMBEDDING_MODEL");

        assert_eq!(config.rag.chunk_size, 300);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.ollama.embedding_model, "mxbai-embed-large");
    }

    #[test]
    #[serial]
    fn test_cli_data_dir_override() {
        let mut cli = bare_cli();
        cli.data_dir = Some(PathBuf::from("/srv/personas"));
        let config = Config::load("nonexistent.yaml", &cli).unwrap();
        assert_eq!(
            config.storage.database_path().unwrap(),
            PathBuf::from("/srv/personas/ragpersona.db")
        );
    }
}
