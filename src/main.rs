//! CodeScout - convergence-driven codebase analysis
//!
//! A CLI tool where an analyzer agent explores a codebase through
//! validated read-only shell commands and a reviewer agent judges the
//! findings, looping until the answer converges or the caps are hit.
//!
//! Exit codes:
//!   0 - Converged (reviewer approved the answer)
//!   1 - Runtime error (connection, config, clone failure, etc.)
//!   2 - Exhausted (answer produced but not approved within the cycle cap)
//!   130 - Interrupted by Ctrl-C

mod agents;
mod backend;
mod cli;
mod config;
mod knowledge;
mod models;
mod orchestrator;
mod report;
mod repo;
mod session_log;
mod shell;

use anyhow::{Context, Result};
use backend::{OllamaBackend, OllamaConfig};
use cli::{Args, OutputFormat};
use config::Config;
use models::{Session, SessionStatus};
use orchestrator::{Orchestrator, OrchestratorConfig};
use session_log::SessionLog;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("CodeScout v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_session(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("\nError: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .codescout.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(".codescout.toml");

    if path.exists() {
        eprintln!(".codescout.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .codescout.toml")?;

    println!("Created .codescout.toml with default settings.");
    println!("Edit it to customize model, caps, and shell limits.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run one complete analysis session. Returns the process exit code.
async fn run_session(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let task = args.task_text().to_string();

    // Step 1: Get the codebase
    let codebase_root = get_codebase(&args)?;
    let codebase_root = codebase_root
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", codebase_root.display()))?;
    info!("Analyzing codebase at: {}", codebase_root.display());

    // Step 2: Build the backend
    let backend = OllamaBackend::new(OllamaConfig {
        base_url: config.model.ollama_url.clone(),
        model: config.model.name.clone(),
        temperature: config.model.temperature,
        timeout: Duration::from_secs(config.model.timeout_seconds),
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize backend: {}", e))?;

    if !args.quiet {
        println!("Model: {} @ {}", config.model.name, config.model.ollama_url);
        println!(
            "Caps: {} rounds/cycle, {} review cycles",
            config.orchestrator.max_rounds, config.orchestrator.max_review_cycles
        );
        println!("\nTask: {}\n", task);
    }

    // Step 3: Run the convergence loop
    let session = Session::new(task, codebase_root.clone(), codebase_root);
    let orchestrator_config = OrchestratorConfig {
        max_rounds: config.orchestrator.max_rounds,
        max_review_cycles: config.orchestrator.max_review_cycles,
        backend_attempts: config.model.attempts,
        command_timeout: Duration::from_secs(config.shell.timeout_seconds),
        max_output_chars: config.shell.max_output_chars,
    };
    let orchestrator = Orchestrator::new(orchestrator_config, session, Arc::new(backend));

    let outcome = tokio::select! {
        outcome = orchestrator.run() => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted.");
            std::process::exit(130);
        }
    };

    // Step 4: Write the session log
    let log = SessionLog::from_outcome(&outcome);
    match log.write_to(Path::new(&config.general.logs_dir)) {
        Ok(path) => {
            if !args.quiet {
                println!("Session log: {}", path.display());
            }
        }
        Err(e) => warn!("Failed to write session log: {}", e),
    }

    // Step 5: Render the result
    let exit_code = match outcome.session.status {
        SessionStatus::Converged => 0,
        SessionStatus::Exhausted => 2,
        SessionStatus::Failed | SessionStatus::Running => 1,
    };

    match outcome.answer {
        Some(ref answer) => {
            let rendered = match args.format {
                OutputFormat::Json => report::render_json(answer, &outcome.stats)?,
                OutputFormat::Text => report::render_text(answer),
            };

            match args.output {
                Some(ref path) => {
                    std::fs::write(path, &rendered)
                        .with_context(|| format!("Failed to write output: {}", path.display()))?;
                    if !args.quiet {
                        println!("Answer saved to: {}", path.display());
                    }
                }
                None => println!("{}", rendered),
            }
        }
        None => {
            let diagnostic = outcome
                .diagnostic
                .as_deref()
                .unwrap_or("session produced no answer");
            eprintln!("\nSession failed: {}", diagnostic);
        }
    }

    if !args.quiet {
        println!("\n{}", report::render_summary(&outcome.stats));
    }

    Ok(exit_code)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .codescout.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// Get the codebase path (clone if a remote URL was given).
fn get_codebase(args: &Args) -> Result<PathBuf> {
    // Use local directory if specified
    if let Some(ref local) = args.local {
        info!("Using local directory: {}", local.display());
        return Ok(local.clone());
    }

    // Clone the repository
    let repo_url = args
        .repo
        .as_deref()
        .context("No codebase source provided")?;
    info!("Cloning repository: {}", repo_url);

    let clone_options = repo::CloneOptions {
        branch: args.branch.clone(),
        depth: Some(1), // Shallow clone
        show_progress: !args.quiet,
    };

    let clone_result = repo::clone_repository(repo_url, clone_options)?;
    Ok(clone_result.into_path())
}
