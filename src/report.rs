//! Final answer rendering.
//!
//! Converged and exhausted sessions both yield an answer; the exhausted one
//! carries an explicit note that it may be incomplete, plus the reviewer's
//! outstanding feedback as areas for further investigation.

use crate::models::{FinalAnswer, SessionStats};
use anyhow::Result;

/// Render the final answer as readable text.
pub fn render_text(answer: &FinalAnswer) -> String {
    let mut output = String::new();

    output.push_str("# Codebase Analysis Results\n\n");
    output.push_str(&format!("## Task: {}\n\n", answer.task));
    output.push_str("## Analysis:\n");
    output.push_str(&answer.answer);
    output.push('\n');

    if answer.converged {
        if let Some(feedback) = &answer.reviewer_feedback {
            if !feedback.is_empty() {
                output.push_str("\n## Specialist Review:\n");
                output.push_str(feedback);
                output.push('\n');
            }
        }
    } else {
        output.push_str(
            "\n## Note:\nThis analysis was completed after reaching the maximum number of review cycles without reviewer approval. While comprehensive, there may be areas that could benefit from further investigation.\n",
        );
        if let Some(feedback) = &answer.reviewer_feedback {
            if !feedback.is_empty() {
                output.push_str("\n## Areas for Further Investigation:\n");
                output.push_str(feedback);
                output.push('\n');
            }
        }
    }

    output
}

/// Render the final answer and stats as a JSON record.
pub fn render_json(answer: &FinalAnswer, stats: &SessionStats) -> Result<String> {
    let record = serde_json::json!({
        "task": answer.task,
        "answer": answer.answer,
        "converged": answer.converged,
        "status": answer.status,
        "reviewer_feedback": answer.reviewer_feedback,
        "stats": stats,
    });
    Ok(serde_json::to_string_pretty(&record)?)
}

/// One-line summary of the session for the console.
pub fn render_summary(stats: &SessionStats) -> String {
    format!(
        "rounds: {} | review cycles: {} | commands: {} executed, {} rejected, {} failed, {} timed out | {:.1}s",
        stats.rounds_total,
        stats.review_cycles,
        stats.commands_executed,
        stats.commands_rejected,
        stats.commands_failed,
        stats.commands_timed_out,
        stats.duration_seconds,
    )
}
