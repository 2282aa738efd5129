//! Session log artifact.
//!
//! Each session leaves behind one structured JSON record: the ordered turn
//! sequence, execution statistics, terminal status, and the final answer.
//! The record is evidence for later inspection; nothing in the core reads
//! it back.

use crate::models::{FinalAnswer, SessionStats, SessionStatus, TurnRecord};
use crate::orchestrator::SessionOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// The serialized shape of one session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionLog {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub task: String,
    pub codebase_root: PathBuf,
    pub status: SessionStatus,
    pub turns: Vec<TurnRecord>,
    pub stats: SessionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<FinalAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl SessionLog {
    pub fn from_outcome(outcome: &SessionOutcome) -> Self {
        Self {
            session_id: outcome.session.id,
            started_at: outcome.session.started_at,
            task: outcome.session.task.clone(),
            codebase_root: outcome.session.codebase_root.clone(),
            status: outcome.session.status,
            turns: outcome.turns.clone(),
            stats: outcome.stats.clone(),
            final_answer: outcome.answer.clone(),
            diagnostic: outcome.diagnostic.clone(),
        }
    }

    /// Write the log as `session-<id>.json` under `logs_dir`, creating the
    /// directory if needed. Returns the path written.
    pub fn write_to(&self, logs_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory: {}", logs_dir.display()))?;

        let path = logs_dir.join(format!("session-{}.json", self.session_id));
        let json = serde_json::to_string_pretty(self).context("Failed to serialize session log")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write session log: {}", path.display()))?;

        info!(path = %path.display(), "session log written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Session;
    use tempfile::TempDir;

    fn outcome() -> SessionOutcome {
        let session = Session::new(
            "find the auth flow".to_string(),
            PathBuf::from("/repo"),
            PathBuf::from("/repo"),
        );
        SessionOutcome {
            session,
            answer: Some(FinalAnswer {
                task: "find the auth flow".to_string(),
                answer: "It is in src/auth.rs".to_string(),
                converged: true,
                reviewer_feedback: None,
                status: SessionStatus::Converged,
            }),
            diagnostic: None,
            turns: vec![TurnRecord::Analyzer {
                index: 0,
                timestamp: Utc::now(),
                content: "done".to_string(),
                command: None,
            }],
            stats: SessionStats::default(),
        }
    }

    #[test]
    fn test_log_round_trips_through_json() {
        let mut out = outcome();
        out.session.status = SessionStatus::Converged;
        let log = SessionLog::from_outcome(&out);

        let json = serde_json::to_string(&log).unwrap();
        let parsed: SessionLog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session_id, log.session_id);
        assert_eq!(parsed.status, SessionStatus::Converged);
        assert_eq!(parsed.turns.len(), 1);
    }

    #[test]
    fn test_log_written_to_disk() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::from_outcome(&outcome());

        let path = log.write_to(&dir.path().join("logs")).unwrap();
        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("find the auth flow"));
        assert!(content.contains(&log.session_id.to_string()));
    }
}
