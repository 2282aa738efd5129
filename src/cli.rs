//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// CodeScout - convergence-driven codebase analysis
///
/// Answer questions about a codebase using local AI. An analyzer agent
/// explores the code through validated read-only shell commands, and a
/// reviewer agent judges the findings until they converge.
///
/// Examples:
///   codescout "how is authentication implemented?" --local ./my-project
///   codescout "map the request pipeline" --repo https://github.com/owner/repo.git
///   codescout "find the retry logic" --local . --format json
///   codescout --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// The question or task to investigate
    ///
    /// Not required when using --init-config.
    #[arg(value_name = "TASK", required_unless_present = "init_config")]
    pub task: Option<String>,

    /// Local directory to analyze
    #[arg(short, long, value_name = "DIR", conflicts_with = "repo")]
    pub local: Option<PathBuf>,

    /// Git repository URL to clone and analyze
    ///
    /// Supports HTTPS URLs (e.g., https://github.com/owner/repo.git).
    #[arg(short, long, value_name = "URL")]
    pub repo: Option<String>,

    /// Specific branch to analyze
    ///
    /// If not specified, uses the default branch
    #[arg(short, long, value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Ollama model to use for both agents
    ///
    /// Recommended models: llama3.2:latest, qwen2.5-coder:32b.
    /// Can also be set via CODESCOUT_MODEL env var or .codescout.toml config.
    #[arg(
        short,
        long,
        default_value = "llama3.2:latest",
        env = "CODESCOUT_MODEL"
    )]
    pub model: String,

    /// Ollama API endpoint URL
    #[arg(long, default_value = "http://localhost:11434", env = "OLLAMA_URL")]
    pub ollama_url: String,

    /// Temperature for LLM responses (0.0 - 1.0)
    ///
    /// Lower values produce more consistent/deterministic output
    #[arg(long, default_value = "0.1")]
    pub temperature: f32,

    /// LLM request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Exploration rounds per review cycle
    #[arg(long, value_name = "COUNT")]
    pub max_rounds: Option<u32>,

    /// Reviewer evaluations before giving up
    #[arg(long, value_name = "COUNT")]
    pub max_review_cycles: Option<u32>,

    /// Timeout per shell command in seconds
    #[arg(long, value_name = "SECS")]
    pub shell_timeout: Option<u64>,

    /// Maximum captured characters per command output stream
    #[arg(long, value_name = "CHARS")]
    pub max_output_chars: Option<usize>,

    /// Output format (text, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the final answer to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Directory for session log files
    ///
    /// Defaults to ./logs (or the config file value).
    #[arg(long, value_name = "DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .codescout.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .codescout.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Readable text (default)
    #[default]
    Text,
    /// JSON record with stats
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the task text, or an empty string if not set (validation runs
    /// before this is used).
    pub fn task_text(&self) -> &str {
        self.task.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.task.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err("Task must not be empty".to_string());
        }

        // Exactly one codebase source
        if self.local.is_none() && self.repo.is_none() {
            return Err("Provide a codebase with --local DIR or --repo URL".to_string());
        }

        if let Some(repo) = self.repo.as_deref() {
            if !repo.starts_with("https://") && !repo.starts_with("git@") {
                return Err("Repository URL must start with 'https://' or 'git@'".to_string());
            }
        }

        if !self.ollama_url.starts_with("http://") && !self.ollama_url.starts_with("https://") {
            return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
        }

        // Validate temperature range
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("Temperature must be between 0.0 and 1.0".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }
        if let Some(shell_timeout) = self.shell_timeout {
            if shell_timeout == 0 {
                return Err("Shell timeout must be at least 1 second".to_string());
            }
        }
        if self.max_rounds == Some(0) {
            return Err("Max rounds must be at least 1".to_string());
        }
        if self.max_review_cycles == Some(0) {
            return Err("Max review cycles must be at least 1".to_string());
        }

        // Validate local directory if provided
        if let Some(ref local_path) = self.local {
            if !local_path.exists() {
                return Err(format!(
                    "Local directory does not exist: {}",
                    local_path.display()
                ));
            }
            if !local_path.is_dir() {
                return Err(format!(
                    "Local path is not a directory: {}",
                    local_path.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            task: Some("how does logging work?".to_string()),
            local: Some(PathBuf::from(".")),
            repo: None,
            branch: None,
            model: "test".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            temperature: 0.1,
            timeout: None,
            max_rounds: None,
            max_review_cycles: None,
            shell_timeout: None,
            max_output_chars: None,
            format: OutputFormat::Text,
            output: None,
            logs_dir: None,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_valid_args() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_source() {
        let mut args = make_args();
        args.local = None;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_empty_task() {
        let mut args = make_args();
        args.task = Some("   ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_repo_url() {
        let mut args = make_args();
        args.local = None;
        args.repo = Some("invalid-url".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_caps() {
        let mut args = make_args();
        args.max_rounds = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.max_review_cycles = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.task = None;
        args.local = None;
        args.init_config = true;
        assert!(args.validate().is_ok());
    }
}
