//! Analyzer role adapter.
//!
//! The analyzer explores the codebase by proposing read-only shell commands
//! and reporting incremental findings. Its free-text replies are parsed here,
//! at a single boundary, into a closed [`AnalyzerAction`] so the orchestrator
//! never dispatches on raw model output.

use crate::backend::{complete_with_retry, BackendError, ChatMessage, CompletionBackend};
use crate::models::AnalyzerAction;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const COMMAND_MARKER: &str = "COMMAND:";
const COMPLETE_MARKER: &str = "ANALYSIS COMPLETE";

const SYSTEM_PROMPT: &str = r#"You are a Code Analyzer, a technical expert responsible for comprehensive codebase analysis.

You explore the codebase one shell command at a time. Only READ-ONLY commands are permitted and enforced:
- File exploration: ls, find, tree
- Content reading: cat, head, tail
- Text processing: grep, rg, sort, uniq, cut, awk (no system() or pipes inside the program), sed (print/substitute only; no in-place editing, no w/e commands)
- Information: wc, file, stat, du

Pipes between these commands are allowed. Command chaining (;, &&), redirection, and anything that writes are rejected by a validator before execution. All paths must stay inside the codebase root.

RESPONSE FORMAT — reply in exactly one of two shapes:

1. To keep exploring, state what you learned this round, then propose ONE command on its own line:
FINDING: <what you learned from the previous observation, if anything>
COMMAND: <one shell command>

2. When you have enough information to answer the task, reply:
ANALYSIS COMPLETE
<your full answer: relevant code structures, integration points, implementation recommendations based on existing patterns, potential conflicts or considerations>

Build knowledge incrementally: start broad (project structure), then use targeted searches driven by the task, then read the specific files that matter."#;

/// Builds analyzer prompts and parses analyzer replies.
pub struct Analyzer {
    backend: Arc<dyn CompletionBackend>,
    max_attempts: u32,
}

/// Context the orchestrator supplies for one exploration round.
pub struct AnalyzerContext<'a> {
    pub task: &'a str,
    pub codebase_root: &'a Path,
    pub knowledge: &'a str,
    pub last_observation: Option<&'a str>,
    pub reviewer_feedback: Option<&'a str>,
    pub round: u32,
    pub max_rounds: u32,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn CompletionBackend>, max_attempts: u32) -> Self {
        Self {
            backend,
            max_attempts,
        }
    }

    /// Ask the analyzer for its next action.
    ///
    /// Backend errors are returned only after the retry budget is exhausted;
    /// a malformed reply never errors — it degrades to a plain finding so the
    /// round cap still bounds the loop.
    pub async fn next_action(
        &self,
        context: &AnalyzerContext<'_>,
    ) -> Result<AnalyzerAction, BackendError> {
        let prompt = build_prompt(context);
        let history = [ChatMessage::user(prompt)];

        let reply =
            complete_with_retry(&*self.backend, SYSTEM_PROMPT, &history, self.max_attempts)
                .await?;

        let action = parse_action(&reply);
        debug!(
            round = context.round,
            complete = matches!(action, AnalyzerAction::Complete { .. }),
            "analyzer action parsed"
        );
        Ok(action)
    }
}

fn build_prompt(context: &AnalyzerContext<'_>) -> String {
    let mut prompt = format!(
        "Task: {}\nCodebase root: {}\nExploration round: {}/{}\n",
        context.task,
        context.codebase_root.display(),
        context.round,
        context.max_rounds,
    );

    if context.knowledge.is_empty() {
        prompt.push_str("\nNo knowledge accumulated yet. Start with broad exploration.\n");
    } else {
        prompt.push_str("\nKnowledge accumulated so far:\n");
        prompt.push_str(context.knowledge);
        prompt.push('\n');
    }

    if let Some(observation) = context.last_observation {
        prompt.push_str("\nObservation from your previous command:\n");
        prompt.push_str(observation);
        prompt.push('\n');
    }

    if let Some(feedback) = context.reviewer_feedback {
        prompt.push_str("\nReviewer feedback on your previous analysis:\n");
        prompt.push_str(feedback);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nContinue the analysis. Either propose the next COMMAND or declare ANALYSIS COMPLETE with your answer.",
    );
    prompt
}

/// Parse a free-text analyzer reply into an [`AnalyzerAction`].
pub fn parse_action(reply: &str) -> AnalyzerAction {
    let trimmed = reply.trim();

    // Completion: everything after the marker line is the answer.
    for (i, line) in trimmed.lines().enumerate() {
        if line.trim().to_uppercase().starts_with(COMPLETE_MARKER) {
            let answer: String = trimmed
                .lines()
                .skip(i + 1)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            return AnalyzerAction::Complete { answer };
        }
    }

    // Continuation: the first COMMAND: line carries the proposal, the rest
    // of the text is the finding.
    let mut command = None;
    let mut finding_lines = Vec::new();
    for line in trimmed.lines() {
        let stripped = line.trim();
        if command.is_none() && stripped.to_uppercase().starts_with(COMMAND_MARKER) {
            let proposed = stripped[COMMAND_MARKER.len()..].trim();
            if !proposed.is_empty() {
                command = Some(proposed.to_string());
                continue;
            }
        }
        finding_lines.push(line);
    }

    let finding = finding_lines
        .join("\n")
        .trim()
        .trim_start_matches("FINDING:")
        .trim()
        .to_string();

    if command.is_none() {
        warn!("analyzer reply carried no command and no completion marker");
    }

    AnalyzerAction::Continue { finding, command }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_command_action() {
        let reply = "FINDING: The project is a Rust workspace.\nCOMMAND: ls -la src";
        let action = parse_action(reply);
        assert_eq!(
            action,
            AnalyzerAction::Continue {
                finding: "The project is a Rust workspace.".to_string(),
                command: Some("ls -la src".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_completion() {
        let reply = "ANALYSIS COMPLETE\nThe auth flow lives in src/auth.rs and uses JWT.";
        let action = parse_action(reply);
        assert_eq!(
            action,
            AnalyzerAction::Complete {
                answer: "The auth flow lives in src/auth.rs and uses JWT.".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_completion_is_case_insensitive() {
        let action = parse_action("analysis complete\ndone");
        assert!(matches!(action, AnalyzerAction::Complete { .. }));
    }

    #[test]
    fn test_malformed_reply_degrades_to_finding() {
        let reply = "I think we should look at the config module next.";
        let action = parse_action(reply);
        assert_eq!(
            action,
            AnalyzerAction::Continue {
                finding: reply.to_string(),
                command: None,
            }
        );
    }

    #[test]
    fn test_only_first_command_line_is_used() {
        let reply = "COMMAND: ls\nCOMMAND: cat /etc/passwd";
        let action = parse_action(reply);
        match action {
            AnalyzerAction::Continue { command, finding } => {
                assert_eq!(command.as_deref(), Some("ls"));
                assert!(finding.contains("cat /etc/passwd"));
            }
            _ => panic!("expected continue"),
        }
    }

    #[test]
    fn test_prompt_includes_context() {
        let root = PathBuf::from("/repo");
        let prompt = build_prompt(&AnalyzerContext {
            task: "add OAuth support",
            codebase_root: &root,
            knowledge: "Found existing session middleware.",
            last_observation: Some("src/auth.rs exists"),
            reviewer_feedback: Some("missing database schema assessment"),
            round: 2,
            max_rounds: 5,
        });
        assert!(prompt.contains("add OAuth support"));
        assert!(prompt.contains("/repo"));
        assert!(prompt.contains("2/5"));
        assert!(prompt.contains("session middleware"));
        assert!(prompt.contains("src/auth.rs exists"));
        assert!(prompt.contains("database schema"));
    }
}
