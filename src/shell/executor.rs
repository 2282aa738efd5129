//! Shell command execution with timeout and output caps.
//!
//! Commands arrive here only after passing the validator, so the executor's
//! job is containment rather than policy: it spawns the validated programs
//! directly (wiring pipeline segments together itself, so no shell grammar
//! ever reaches the operating system), enforces the configured timeout, and
//! caps captured output.

use crate::models::{CommandRequest, CommandResult, ExecFailure};
use crate::shell::validator::{split_pipeline, tokenize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Marker appended when output is cut at the cap. The cap value is included
/// so re-applying the cap can recognize already-truncated text.
fn truncation_marker(cap: usize) -> String {
    format!("\n... (output truncated at {} characters)", cap)
}

/// Cap `text` at `cap` characters, appending the truncation marker.
///
/// Idempotent: applying the cap to already-truncated output returns it
/// unchanged.
pub fn truncate_output(text: &str, cap: usize) -> (String, bool) {
    let marker = truncation_marker(cap);
    if text.ends_with(&marker) && text.chars().count() <= cap + marker.chars().count() {
        return (text.to_string(), true);
    }
    if text.chars().count() <= cap {
        return (text.to_string(), false);
    }
    let mut truncated: String = text.chars().take(cap).collect();
    truncated.push_str(&marker);
    (truncated, true)
}

/// Executes validated commands inside the session working directory.
///
/// Stateless apart from execution counters; spawns exactly one child
/// pipeline per call.
#[derive(Debug)]
pub struct ShellExecutor {
    timeout: Duration,
    max_output_chars: usize,
    stats: ExecutorStats,
}

/// Counters kept across a session for the final summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorStats {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub timed_out: u32,
}

impl ShellExecutor {
    pub fn new(timeout: Duration, max_output_chars: usize) -> Self {
        Self {
            timeout,
            max_output_chars,
            stats: ExecutorStats::default(),
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats
    }

    /// Execute a permitted command and capture its outcome.
    ///
    /// Never returns `Err`: timeouts, spawn failures, and non-zero exits are
    /// all reported inside the [`CommandResult`] so the conversation can
    /// continue.
    pub async fn execute(&mut self, request: &CommandRequest) -> CommandResult {
        let start = Instant::now();
        self.stats.total += 1;
        info!(command = %request.command, "executing command");

        let result = match tokio::time::timeout(self.timeout, self.run_pipeline(request)).await {
            Ok(Ok((exit_code, stdout, stderr))) => {
                let (stdout, out_cut) = truncate_output(&stdout, self.max_output_chars);
                let (stderr, err_cut) = truncate_output(&stderr, self.max_output_chars);
                CommandResult {
                    exit_code,
                    stdout,
                    stderr,
                    truncated: out_cut || err_cut,
                    duration_ms: start.elapsed().as_millis() as u64,
                    failure: None,
                }
            }
            Ok(Err(message)) => {
                self.stats.failed += 1;
                warn!(command = %request.command, %message, "command spawn failed");
                CommandResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    truncated: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                    failure: Some(ExecFailure::Spawn { message }),
                }
            }
            // Timeout: the children are killed on drop; the session goes on.
            Err(_) => {
                self.stats.timed_out += 1;
                warn!(command = %request.command, timeout = ?self.timeout, "command timed out");
                CommandResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    truncated: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                    failure: Some(ExecFailure::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }),
                }
            }
        };

        if result.succeeded() {
            self.stats.succeeded += 1;
            debug!(
                command = %request.command,
                duration_ms = result.duration_ms,
                output_len = result.stdout.len(),
                "command completed"
            );
        } else if result.failure.is_none() {
            self.stats.failed += 1;
        }

        result
    }

    /// Spawn the pipeline and wait for it, returning the last segment's exit
    /// code plus captured stdout/stderr.
    async fn run_pipeline(
        &self,
        request: &CommandRequest,
    ) -> Result<(Option<i32>, String, String), String> {
        let parts = split_pipeline(&request.command)
            .ok_or_else(|| "unbalanced quotes".to_string())?;
        let segments: Vec<Vec<String>> = parts
            .iter()
            .map(|segment| tokenize(segment).unwrap_or_default())
            .collect();

        if segments.iter().any(|tokens| tokens.is_empty()) {
            return Err("empty pipeline segment".to_string());
        }

        let mut children: Vec<Child> = Vec::with_capacity(segments.len());
        let last = segments.len() - 1;

        for (i, tokens) in segments.iter().enumerate() {
            let mut command = Command::new(&tokens[0]);
            command
                .args(&tokens[1..])
                .current_dir(&request.working_dir)
                .stdout(Stdio::piped())
                .kill_on_drop(true);

            // Only the final segment's stderr is fed back into the
            // conversation; intermediate diagnostics are discarded.
            if i == last {
                command.stderr(Stdio::piped());
            } else {
                command.stderr(Stdio::null());
            }

            if i == 0 {
                command.stdin(Stdio::null());
            } else {
                let upstream = children[i - 1]
                    .stdout
                    .take()
                    .ok_or_else(|| "failed to connect pipeline".to_string())?;
                let stdin: Stdio = upstream
                    .try_into()
                    .map_err(|_| "failed to connect pipeline".to_string())?;
                command.stdin(stdin);
            }

            let child = command
                .spawn()
                .map_err(|e| format!("{}: {}", tokens[0], e))?;
            children.push(child);
        }

        let mut tail = children.pop().expect("pipeline has at least one segment");

        // Drain both streams together; a stderr-heavy child must not block
        // on a full pipe while stdout is still being read.
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let stdout = tail.stdout.take();
        let stderr = tail.stderr.take();
        let (stdout_read, stderr_read) = tokio::join!(
            async {
                match stdout {
                    Some(mut stream) => stream.read_to_end(&mut stdout_buf).await,
                    None => Ok(0),
                }
            },
            async {
                match stderr {
                    Some(mut stream) => stream.read_to_end(&mut stderr_buf).await,
                    None => Ok(0),
                }
            }
        );
        stdout_read.map_err(|e| format!("failed to read stdout: {}", e))?;
        stderr_read.map_err(|e| format!("failed to read stderr: {}", e))?;

        let status = tail
            .wait()
            .await
            .map_err(|e| format!("failed to wait for command: {}", e))?;

        // Reap the upstream segments so none outlive the call.
        for mut child in children {
            let _ = child.wait().await;
        }

        Ok((
            status.code(),
            String::from_utf8_lossy(&stdout_buf).into_owned(),
            String::from_utf8_lossy(&stderr_buf).into_owned(),
        ))
    }
}
