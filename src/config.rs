//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.codescout.toml` files. CLI arguments take precedence over file values;
//! the merged result is handed to the orchestrator as a plain value, so
//! there is no ambient global configuration anywhere.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Convergence loop settings.
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Shell execution settings.
    #[serde(default)]
    pub shell: ShellConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory where session logs are written.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            verbose: false,
        }
    }
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama-compatible API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,

    /// Total attempts per backend call (1 initial + retries).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_request_timeout(),
            attempts: default_attempts(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_request_timeout() -> u64 {
    120
}

fn default_attempts() -> u32 {
    3
}

/// Convergence loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Exploration rounds allowed within one review cycle.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Reviewer evaluations before the session is exhausted.
    #[serde(default = "default_max_review_cycles")]
    pub max_review_cycles: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_review_cycles: default_max_review_cycles(),
        }
    }
}

fn default_max_rounds() -> u32 {
    5
}

fn default_max_review_cycles() -> u32 {
    3
}

/// Shell execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Timeout per command in seconds.
    #[serde(default = "default_command_timeout")]
    pub timeout_seconds: u64,

    /// Maximum captured output per stream, in characters.
    #[serde(default = "default_max_output")]
    pub max_output_chars: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_command_timeout(),
            max_output_chars: default_max_output(),
        }
    }
}

fn default_command_timeout() -> u64 {
    30
}

fn default_max_output() -> usize {
    10_000
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
    /// can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".codescout.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence; optional flags only override when
    /// explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        self.model.name = args.model.clone();
        self.model.ollama_url = args.ollama_url.clone();
        self.model.temperature = args.temperature;

        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(max_rounds) = args.max_rounds {
            self.orchestrator.max_rounds = max_rounds;
        }
        if let Some(max_cycles) = args.max_review_cycles {
            self.orchestrator.max_review_cycles = max_cycles;
        }
        if let Some(shell_timeout) = args.shell_timeout {
            self.shell.timeout_seconds = shell_timeout;
        }
        if let Some(max_output) = args.max_output_chars {
            self.shell.max_output_chars = max_output;
        }
        if let Some(ref logs_dir) = args.logs_dir {
            self.general.logs_dir = logs_dir.display().to_string();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
