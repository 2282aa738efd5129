//! Git repository cloning for `--repo` targets.
//!
//! Clones the requested repository shallowly into a temporary directory so
//! the analysis session can treat it like any local codebase.

use anyhow::{Context, Result};
use git2::{FetchOptions, Progress, RemoteCallbacks};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// A cloned repository ready for analysis.
pub struct CloneResult {
    /// Path to the working tree.
    pub path: PathBuf,
    /// Temp directory handle keeping the clone alive for the session.
    temp_dir: TempDir,
}

impl CloneResult {
    /// Consume the result, persisting the clone for the session's lifetime
    /// and returning its path.
    pub fn into_path(self) -> PathBuf {
        let CloneResult { path, temp_dir } = self;
        let _ = temp_dir.keep();
        path
    }
}

/// Options for cloning a repository.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Branch to checkout (None for the default branch).
    pub branch: Option<String>,
    /// Depth for shallow clone (None for a full clone).
    pub depth: Option<i32>,
    /// Whether to show a progress bar.
    pub show_progress: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            branch: None,
            depth: Some(1),
            show_progress: true,
        }
    }
}

/// Clone a repository from a URL into a fresh temp directory.
pub fn clone_repository(url: &str, options: CloneOptions) -> Result<CloneResult> {
    info!("Cloning repository: {}", url);

    let temp_dir = TempDir::new().context("Failed to create temporary directory")?;
    let path = temp_dir.path().to_path_buf();
    debug!("Clone target: {}", path.display());

    let progress_bar = if options.show_progress {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(Arc::new(pb))
    } else {
        None
    };

    let pb_clone = progress_bar.clone();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |progress: Progress<'_>| {
        if let Some(ref pb) = pb_clone {
            pb.set_length(progress.total_objects() as u64);
            pb.set_position(progress.received_objects() as u64);
        }
        true
    });

    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(callbacks);
    if let Some(depth) = options.depth {
        fetch_opts.depth(depth);
    }

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_opts);
    if let Some(ref branch) = options.branch {
        builder.branch(branch);
    }

    builder
        .clone(url, &path)
        .with_context(|| format!("Failed to clone repository: {}", url))?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Clone complete");
    }

    info!("Successfully cloned repository to: {}", path.display());

    Ok(CloneResult { path, temp_dir })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_options_default() {
        let opts = CloneOptions::default();
        assert!(opts.branch.is_none());
        assert_eq!(opts.depth, Some(1));
        assert!(opts.show_progress);
    }
}
