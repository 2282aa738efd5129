//! Reviewer role adapter.
//!
//! The reviewer acts as a project manager: it judges whether the accumulated
//! findings answer the user's task and, when rejecting, says WHAT is missing
//! rather than HOW to find it. Verdict parsing happens here at a single
//! boundary; a malformed reply is a rejection with generic feedback, never a
//! retry, so the loop always progresses toward its cycle limit.

use crate::backend::{complete_with_retry, BackendError, ChatMessage, CompletionBackend};
use crate::models::ReviewVerdict;
use std::sync::Arc;
use tracing::{debug, warn};

const VERDICT_MARKER: &str = "VERDICT:";

/// Feedback used when the backend's verdict cannot be parsed.
const MALFORMED_FEEDBACK: &str =
    "The review could not be interpreted. Deepen the analysis with concrete evidence from the codebase: relevant files, existing patterns, and integration points.";

const SYSTEM_PROMPT: &str = r#"You are a Task Specialist, acting as a project manager responsible for reviewing analysis completeness and ensuring results meet user requirements.

REVIEW CRITERIA — check whether the analysis includes:
- Identification of existing related functionality
- Clear integration points and connection strategies
- Specific implementation steps and recommendations
- Potential conflicts or issues identification
- Concrete code examples or patterns from the codebase
- Understanding of project architecture and conventions
- Consideration of dependencies and compatibility

FEEDBACK GUIDELINES:
- Provide abstract, high-level guidance
- Focus on WHAT information is missing, not HOW to find it
- Never suggest specific shell commands

Example of good feedback: "Need deeper analysis of existing authentication mechanisms and their integration patterns"
Example of bad feedback: "Run grep commands to find auth files"

RESPONSE FORMAT — the first line must be exactly one of:
VERDICT: APPROVED
VERDICT: REJECTED
followed by your feedback on the lines after it."#;

/// Builds reviewer prompts and parses verdicts.
pub struct Reviewer {
    backend: Arc<dyn CompletionBackend>,
    max_attempts: u32,
}

impl Reviewer {
    pub fn new(backend: Arc<dyn CompletionBackend>, max_attempts: u32) -> Self {
        Self {
            backend,
            max_attempts,
        }
    }

    /// Review the accumulated findings against the task.
    pub async fn review(
        &self,
        task: &str,
        knowledge: &str,
        cycle: u32,
        max_cycles: u32,
    ) -> Result<ReviewVerdict, BackendError> {
        let prompt = format!(
            "Task: {}\nReview cycle: {}/{}\n\nAccumulated analysis to review:\n{}\n\nIssue your verdict.",
            task, cycle, max_cycles, knowledge,
        );
        let history = [ChatMessage::user(prompt)];

        let reply =
            complete_with_retry(&*self.backend, SYSTEM_PROMPT, &history, self.max_attempts)
                .await?;

        let verdict = parse_verdict(&reply);
        debug!(cycle, approved = verdict.is_approved(), "review verdict parsed");
        Ok(verdict)
    }
}

/// Parse a free-text reviewer reply into a [`ReviewVerdict`].
pub fn parse_verdict(reply: &str) -> ReviewVerdict {
    for (i, line) in reply.trim().lines().enumerate() {
        let stripped = line.trim().to_uppercase();
        if !stripped.starts_with(VERDICT_MARKER) {
            continue;
        }

        let feedback: String = reply
            .trim()
            .lines()
            .skip(i + 1)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        let decision = stripped[VERDICT_MARKER.len()..].trim().to_string();
        if decision.starts_with("APPROVED") {
            return ReviewVerdict::Approved { feedback };
        }
        if decision.starts_with("REJECTED") {
            return ReviewVerdict::Rejected { feedback };
        }
        break;
    }

    warn!("reviewer reply carried no parseable verdict, treating as rejection");
    ReviewVerdict::Rejected {
        feedback: MALFORMED_FEEDBACK.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_approval() {
        let verdict = parse_verdict("VERDICT: APPROVED\nThe analysis covers all criteria.");
        assert_eq!(
            verdict,
            ReviewVerdict::Approved {
                feedback: "The analysis covers all criteria.".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejection() {
        let verdict =
            parse_verdict("VERDICT: REJECTED\nMissing database schema impact assessment.");
        match verdict {
            ReviewVerdict::Rejected { feedback } => {
                assert!(feedback.contains("database schema"));
            }
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_verdict_line_anywhere_in_reply() {
        let verdict = parse_verdict("Let me assess this.\nVERDICT: APPROVED\nWell done.");
        assert!(verdict.is_approved());
    }

    #[test]
    fn test_malformed_verdict_is_rejection() {
        let verdict = parse_verdict("Looks pretty good to me!");
        match verdict {
            ReviewVerdict::Rejected { feedback } => {
                assert_eq!(feedback, MALFORMED_FEEDBACK);
            }
            _ => panic!("malformed output must not approve"),
        }
    }

    #[test]
    fn test_unknown_decision_is_rejection() {
        let verdict = parse_verdict("VERDICT: MAYBE\nNot sure.");
        assert!(!verdict.is_approved());
    }

    #[test]
    fn test_case_insensitive_marker() {
        let verdict = parse_verdict("verdict: approved\nfine");
        assert!(verdict.is_approved());
    }
}
