//! Data models for the analysis session.
//!
//! This module contains the core data structures shared across the
//! orchestrator, the role adapters, and the session log artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Terminal and non-terminal states of an analysis session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The convergence loop is still in progress.
    Running,
    /// The reviewer approved the accumulated findings.
    Converged,
    /// The review-cycle cap was reached without approval.
    Exhausted,
    /// An unrecoverable backend error ended the session.
    Failed,
}

impl SessionStatus {
    /// Whether the session can make no further progress.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Converged => write!(f, "converged"),
            SessionStatus::Exhausted => write!(f, "exhausted"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One analysis run: task, location, counters, and terminal status.
///
/// Owned exclusively by the orchestrator; discarded at the end of the run
/// except for its serialized log artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique id, used for the log artifact filename.
    pub id: Uuid,
    /// The user's task description.
    pub task: String,
    /// Root of the codebase being analyzed.
    pub codebase_root: PathBuf,
    /// Working directory for command execution (usually the root).
    pub working_dir: PathBuf,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Total exploration rounds across all review cycles. Monotonic.
    pub rounds_total: u32,
    /// Exploration rounds within the current review cycle. Resets when a
    /// new cycle begins.
    pub rounds_in_cycle: u32,
    /// Review cycles consumed so far. Monotonic.
    pub review_cycles: u32,
    /// Current status. Never returns to `Running` once terminal.
    pub status: SessionStatus,
}

impl Session {
    pub fn new(task: String, codebase_root: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            codebase_root,
            working_dir,
            started_at: Utc::now(),
            rounds_total: 0,
            rounds_in_cycle: 0,
            review_cycles: 0,
            status: SessionStatus::Running,
        }
    }

    /// Advance the round counters by one exploration round.
    pub fn begin_round(&mut self) {
        self.rounds_total += 1;
        self.rounds_in_cycle += 1;
    }

    /// Begin a new review cycle; the per-cycle round counter resets.
    pub fn begin_review_cycle(&mut self) {
        self.review_cycles += 1;
        self.rounds_in_cycle = 0;
    }
}

/// A single shell invocation proposed by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// The raw command text as proposed by the analyzer.
    pub command: String,
    /// Working directory the command runs in.
    pub working_dir: PathBuf,
}

/// Reasons a command execution failed at the framework level.
///
/// Non-zero exit is not a failure here; it is reported through
/// [`CommandResult::exit_code`] and left for the analyzer to interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecFailure {
    /// The process exceeded the configured timeout and was terminated.
    #[error("command timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    /// The process could not be spawned at all.
    #[error("failed to spawn command: {message}")]
    Spawn { message: String },
}

/// Outcome of executing one [`CommandRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit code of the (last) process, when it ran to completion.
    pub exit_code: Option<i32>,
    /// Captured standard output, possibly truncated.
    pub stdout: String,
    /// Captured standard error, possibly truncated.
    pub stderr: String,
    /// Set when either stream was cut at the output cap.
    pub truncated: bool,
    /// Wall time spent executing, in milliseconds.
    pub duration_ms: u64,
    /// Framework-level failure, if any.
    pub failure: Option<ExecFailure>,
}

impl CommandResult {
    /// Whether the command ran and exited with status zero.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.exit_code == Some(0)
    }

    /// Render the result as observation text for the conversation.
    pub fn to_observation(&self) -> String {
        if let Some(failure) = &self.failure {
            return format!("Command failed: {}", failure);
        }

        let mut text = String::new();
        match self.exit_code {
            Some(0) => {}
            Some(code) => text.push_str(&format!("Exit code: {}\n", code)),
            None => text.push_str("Terminated by signal\n"),
        }
        if !self.stdout.is_empty() {
            text.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("stderr:\n");
            text.push_str(&self.stderr);
        }
        if text.is_empty() {
            text.push_str("(no output)");
        }
        text
    }
}

/// Categorical reasons the validator rejects a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The verb (or one of its flags) is not in the read-only allow-list.
    DisallowedCommand,
    /// The command contains chaining, substitution, or redirection syntax.
    DisallowedSyntax,
    /// A path argument resolves outside the codebase root.
    PathEscape,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::DisallowedCommand => write!(f, "disallowed_command"),
            RejectionReason::DisallowedSyntax => write!(f, "disallowed_syntax"),
            RejectionReason::PathEscape => write!(f, "path_escape"),
        }
    }
}

/// The analyzer's decision for one exploration round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerAction {
    /// Keep exploring: an incremental finding, plus an optional command to
    /// gather more information.
    Continue {
        finding: String,
        command: Option<String>,
    },
    /// The analyzer believes it has enough information.
    Complete { answer: String },
}

/// The reviewer's judgment of the accumulated findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved { feedback: String },
    Rejected { feedback: String },
}

impl ReviewVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, ReviewVerdict::Approved { .. })
    }

    pub fn feedback(&self) -> &str {
        match self {
            ReviewVerdict::Approved { feedback } | ReviewVerdict::Rejected { feedback } => feedback,
        }
    }
}

/// One recorded step of the conversation. Append-only; the ordinal index
/// defines the history fed back to each role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "speaker", rename_all = "snake_case")]
pub enum TurnRecord {
    /// An analyzer statement, optionally carrying a proposed command.
    Analyzer {
        index: u32,
        timestamp: DateTime<Utc>,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    /// The outcome of a command: an execution result or a validation
    /// rejection, rendered as text the analyzer can read.
    Observation {
        index: u32,
        timestamp: DateTime<Utc>,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rejection: Option<RejectionReason>,
    },
    /// A reviewer verdict for one review cycle.
    Reviewer {
        index: u32,
        timestamp: DateTime<Utc>,
        approved: bool,
        feedback: String,
        cycle: u32,
    },
}

impl TurnRecord {
    pub fn index(&self) -> u32 {
        match self {
            TurnRecord::Analyzer { index, .. }
            | TurnRecord::Observation { index, .. }
            | TurnRecord::Reviewer { index, .. } => *index,
        }
    }
}

/// Per-session execution statistics, surfaced in the summary and the log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub rounds_total: u32,
    pub review_cycles: u32,
    pub commands_executed: u32,
    pub commands_rejected: u32,
    pub commands_failed: u32,
    pub commands_timed_out: u32,
    pub duration_seconds: f64,
}

/// The user-facing result of a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// The original task description.
    pub task: String,
    /// The synthesized answer. Empty only for failed sessions.
    pub answer: String,
    /// Whether the reviewer approved the answer.
    pub converged: bool,
    /// The reviewer's last feedback, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_feedback: Option<String>,
    /// Terminal session status.
    pub status: SessionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Converged.is_terminal());
        assert!(SessionStatus::Exhausted.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_session_counters_monotonic() {
        let mut session = Session::new(
            "task".to_string(),
            PathBuf::from("/repo"),
            PathBuf::from("/repo"),
        );

        session.begin_round();
        session.begin_round();
        assert_eq!(session.rounds_total, 2);
        assert_eq!(session.rounds_in_cycle, 2);

        session.begin_review_cycle();
        assert_eq!(session.review_cycles, 1);
        assert_eq!(session.rounds_in_cycle, 0);
        // The total never decreases when a cycle resets the per-cycle count.
        assert_eq!(session.rounds_total, 2);
    }

    #[test]
    fn test_command_result_observation() {
        let result = CommandResult {
            exit_code: Some(1),
            stdout: "partial".to_string(),
            stderr: "grep: no such file".to_string(),
            truncated: false,
            duration_ms: 12,
            failure: None,
        };
        let text = result.to_observation();
        assert!(text.contains("Exit code: 1"));
        assert!(text.contains("partial"));
        assert!(text.contains("grep: no such file"));

        let timeout = CommandResult {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            duration_ms: 30_000,
            failure: Some(ExecFailure::Timeout { timeout_secs: 30 }),
        };
        assert!(timeout.to_observation().contains("timed out after 30s"));
        assert!(!timeout.succeeded());
    }

    #[test]
    fn test_verdict_accessors() {
        let approved = ReviewVerdict::Approved {
            feedback: "good".to_string(),
        };
        assert!(approved.is_approved());
        assert_eq!(approved.feedback(), "good");

        let rejected = ReviewVerdict::Rejected {
            feedback: "missing integration points".to_string(),
        };
        assert!(!rejected.is_approved());
    }

    #[test]
    fn test_turn_record_serde_tagging() {
        let turn = TurnRecord::Observation {
            index: 3,
            timestamp: Utc::now(),
            content: "rejected".to_string(),
            rejection: Some(RejectionReason::PathEscape),
        };
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"speaker\":\"observation\""));
        assert!(json.contains("\"path_escape\""));
    }
}
