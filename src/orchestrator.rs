//! Convergence orchestrator.
//!
//! Drives the round loop between the analyzer and the reviewer: the analyzer
//! explores until it self-declares completion (or the round cap forces a
//! handoff), the reviewer approves or rejects, and rejection feedback flows
//! back into the next exploration cycle. Both caps are enforced
//! unconditionally, so the loop terminates no matter what the models do.

use crate::agents::{Analyzer, AnalyzerContext, Reviewer};
use crate::backend::CompletionBackend;
use crate::knowledge::KnowledgeBase;
use crate::models::{
    AnalyzerAction, CommandRequest, FinalAnswer, RejectionReason, Session, SessionStats,
    SessionStatus, TurnRecord,
};
use crate::shell::{CommandValidator, ShellExecutor, Verdict};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Limits and tunables injected into the orchestrator for one session.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Exploration rounds allowed within one review cycle.
    pub max_rounds: u32,
    /// Reviewer evaluations allowed before the session is exhausted.
    pub max_review_cycles: u32,
    /// Total attempts per backend call (1 initial + retries).
    pub backend_attempts: u32,
    /// Timeout for a single shell command.
    pub command_timeout: Duration,
    /// Cap on captured command output, per stream, in characters.
    pub max_output_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            max_review_cycles: 3,
            backend_attempts: 3,
            command_timeout: Duration::from_secs(30),
            max_output_chars: 10_000,
        }
    }
}

/// Everything a finished session leaves behind.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session: Session,
    /// The final answer; `None` only when the session failed.
    pub answer: Option<FinalAnswer>,
    /// Diagnostic for failed sessions.
    pub diagnostic: Option<String>,
    /// The full ordered conversation.
    pub turns: Vec<TurnRecord>,
    pub stats: SessionStats,
}

/// Internal loop state. Terminal states live on the session itself.
enum LoopState {
    Exploring,
    AwaitingReview,
}

/// Owns the session, the turn log, and the knowledge state; the single
/// writer for all of them.
pub struct Orchestrator {
    config: OrchestratorConfig,
    session: Session,
    analyzer: Analyzer,
    reviewer: Reviewer,
    validator: CommandValidator,
    executor: ShellExecutor,
    knowledge: KnowledgeBase,
    turns: Vec<TurnRecord>,
    commands_rejected: u32,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        session: Session,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let analyzer = Analyzer::new(backend.clone(), config.backend_attempts);
        let reviewer = Reviewer::new(backend, config.backend_attempts);
        let validator = CommandValidator::new(session.codebase_root.clone());
        let executor = ShellExecutor::new(config.command_timeout, config.max_output_chars);

        Self {
            config,
            session,
            analyzer,
            reviewer,
            validator,
            executor,
            knowledge: KnowledgeBase::new(),
            turns: Vec::new(),
            commands_rejected: 0,
        }
    }

    /// Run the convergence loop to a terminal state.
    pub async fn run(mut self) -> SessionOutcome {
        let started = Instant::now();
        info!(
            session = %self.session.id,
            task = %self.session.task,
            "starting analysis session"
        );

        let mut state = LoopState::Exploring;
        let mut pending_answer: Option<String> = None;
        let mut last_observation: Option<String> = None;
        let mut reviewer_feedback: Option<String> = None;

        loop {
            match state {
                LoopState::Exploring => {
                    // Forced handoff: the cycle's round budget is spent, the
                    // reviewer sees whatever knowledge has accumulated.
                    if self.session.rounds_in_cycle >= self.config.max_rounds {
                        warn!(
                            rounds = self.session.rounds_in_cycle,
                            "round cap reached, forcing review handoff"
                        );
                        state = LoopState::AwaitingReview;
                        continue;
                    }

                    self.session.begin_round();
                    let context = AnalyzerContext {
                        task: &self.session.task,
                        codebase_root: &self.session.codebase_root,
                        knowledge: &self.knowledge.snapshot(),
                        last_observation: last_observation.as_deref(),
                        reviewer_feedback: reviewer_feedback.as_deref(),
                        round: self.session.rounds_in_cycle,
                        max_rounds: self.config.max_rounds,
                    };

                    let action = match self.analyzer.next_action(&context).await {
                        Ok(action) => action,
                        Err(e) => return self.fail(started, format!("analyzer backend: {}", e)),
                    };

                    match action {
                        AnalyzerAction::Continue { finding, command } => {
                            self.record_analyzer_turn(finding.clone(), command.clone());
                            self.knowledge.append(finding);

                            last_observation = match command {
                                Some(cmd) => Some(self.handle_command(cmd).await),
                                None => None,
                            };
                        }
                        AnalyzerAction::Complete { answer } => {
                            info!(
                                round = self.session.rounds_in_cycle,
                                "analyzer declared completion"
                            );
                            self.record_analyzer_turn(answer.clone(), None);
                            self.knowledge.append(answer.clone());
                            pending_answer = Some(answer);
                            state = LoopState::AwaitingReview;
                        }
                    }
                }

                LoopState::AwaitingReview => {
                    self.session.begin_review_cycle();
                    let cycle = self.session.review_cycles;
                    info!(cycle, max = self.config.max_review_cycles, "starting review cycle");

                    let snapshot = self.knowledge.snapshot();
                    let verdict = match self
                        .reviewer
                        .review(
                            &self.session.task,
                            &snapshot,
                            cycle,
                            self.config.max_review_cycles,
                        )
                        .await
                    {
                        Ok(verdict) => verdict,
                        Err(e) => return self.fail(started, format!("reviewer backend: {}", e)),
                    };

                    let feedback = verdict.feedback().to_string();
                    self.turns.push(TurnRecord::Reviewer {
                        index: self.turns.len() as u32,
                        timestamp: Utc::now(),
                        approved: verdict.is_approved(),
                        feedback: feedback.clone(),
                        cycle,
                    });

                    let answer = pending_answer.take().unwrap_or(snapshot);

                    if verdict.is_approved() {
                        info!(cycle, "analysis accepted by reviewer");
                        self.session.status = SessionStatus::Converged;
                        return self.finish(started, answer, Some(feedback));
                    }

                    if cycle >= self.config.max_review_cycles {
                        warn!(
                            cycle,
                            "max review cycles reached without approval, emitting unconverged answer"
                        );
                        self.session.status = SessionStatus::Exhausted;
                        return self.finish(started, answer, Some(feedback));
                    }

                    info!(cycle, "analysis rejected, resuming exploration");
                    reviewer_feedback = Some(feedback);
                    last_observation = None;
                    state = LoopState::Exploring;
                }
            }
        }
    }

    /// Validate and, if permitted, execute one proposed command; either way
    /// the outcome is recorded as an observation turn and returned as text
    /// for the analyzer's next prompt.
    async fn handle_command(&mut self, command: String) -> String {
        match self.validator.validate(&command) {
            Verdict::Rejected(reason) => {
                self.commands_rejected += 1;
                warn!(command = %command, %reason, "command rejected by validator");
                let content = rejection_observation(&command, reason);
                self.record_observation(content.clone(), Some(reason));
                content
            }
            Verdict::Permitted => {
                let request = CommandRequest {
                    command,
                    working_dir: self.session.working_dir.clone(),
                };
                let result = self.executor.execute(&request).await;
                let content = result.to_observation();
                self.record_observation(content.clone(), None);
                content
            }
        }
    }

    fn record_analyzer_turn(&mut self, content: String, command: Option<String>) {
        self.turns.push(TurnRecord::Analyzer {
            index: self.turns.len() as u32,
            timestamp: Utc::now(),
            content,
            command,
        });
    }

    fn record_observation(&mut self, content: String, rejection: Option<RejectionReason>) {
        self.turns.push(TurnRecord::Observation {
            index: self.turns.len() as u32,
            timestamp: Utc::now(),
            content,
            rejection,
        });
    }

    fn stats(&self, started: Instant) -> SessionStats {
        let exec = self.executor.stats();
        SessionStats {
            rounds_total: self.session.rounds_total,
            review_cycles: self.session.review_cycles,
            commands_executed: exec.total,
            commands_rejected: self.commands_rejected,
            commands_failed: exec.failed,
            commands_timed_out: exec.timed_out,
            duration_seconds: started.elapsed().as_secs_f64(),
        }
    }

    fn finish(
        self,
        started: Instant,
        answer: String,
        reviewer_feedback: Option<String>,
    ) -> SessionOutcome {
        let stats = self.stats(started);
        let converged = self.session.status == SessionStatus::Converged;
        let final_answer = FinalAnswer {
            task: self.session.task.clone(),
            answer,
            converged,
            reviewer_feedback,
            status: self.session.status,
        };
        SessionOutcome {
            session: self.session,
            answer: Some(final_answer),
            diagnostic: None,
            turns: self.turns,
            stats,
        }
    }

    fn fail(mut self, started: Instant, diagnostic: String) -> SessionOutcome {
        warn!(%diagnostic, "session failed");
        self.session.status = SessionStatus::Failed;
        let stats = self.stats(started);
        SessionOutcome {
            session: self.session,
            answer: None,
            diagnostic: Some(diagnostic),
            turns: self.turns,
            stats,
        }
    }
}

fn rejection_observation(command: &str, reason: RejectionReason) -> String {
    let hint = match reason {
        RejectionReason::DisallowedCommand => {
            "only read-only inspection commands are permitted"
        }
        RejectionReason::DisallowedSyntax => {
            "command chaining, substitution, and redirection are not permitted"
        }
        RejectionReason::PathEscape => "paths must stay inside the codebase root",
    };
    format!(
        "Command rejected ({}): `{}` was not executed; {}. Propose a different command.",
        reason, command, hint
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, ChatMessage};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted backend: separate reply queues per role, routed on the
    /// system prompt. When a queue runs dry the last reply repeats.
    struct ScriptedBackend {
        analyzer: Mutex<VecDeque<String>>,
        reviewer: Mutex<VecDeque<String>>,
    }

    impl ScriptedBackend {
        fn new(analyzer: Vec<&str>, reviewer: Vec<&str>) -> Self {
            Self {
                analyzer: Mutex::new(analyzer.into_iter().map(String::from).collect()),
                reviewer: Mutex::new(reviewer.into_iter().map(String::from).collect()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            system: &str,
            _history: &[ChatMessage],
        ) -> Result<String, BackendError> {
            let queue = if system.contains("Code Analyzer") {
                &self.analyzer
            } else {
                &self.reviewer
            };
            let mut queue = queue.lock().unwrap();
            if queue.len() > 1 {
                Ok(queue.pop_front().unwrap())
            } else {
                queue
                    .front()
                    .cloned()
                    .ok_or_else(|| BackendError::Malformed("script exhausted".to_string()))
            }
        }
    }

    struct DeadBackend;

    #[async_trait]
    impl CompletionBackend for DeadBackend {
        async fn complete(
            &self,
            _system: &str,
            _history: &[ChatMessage],
        ) -> Result<String, BackendError> {
            Err(BackendError::Unreachable("connection refused".to_string()))
        }
    }

    fn session_in(dir: &TempDir, task: &str) -> Session {
        Session::new(
            task.to_string(),
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
        )
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            max_rounds: 3,
            max_review_cycles: 3,
            backend_attempts: 2,
            command_timeout: Duration::from_secs(5),
            max_output_chars: 10_000,
        }
    }

    #[tokio::test]
    async fn test_converges_on_third_cycle() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(
            vec!["ANALYSIS COMPLETE\nThe answer."],
            vec![
                "VERDICT: REJECTED\nMissing integration points.",
                "VERDICT: REJECTED\nMissing dependency assessment.",
                "VERDICT: APPROVED\nComplete now.",
            ],
        ));

        let orchestrator = Orchestrator::new(config(), session_in(&dir, "task"), backend);
        let outcome = orchestrator.run().await;

        assert_eq!(outcome.session.status, SessionStatus::Converged);
        assert_eq!(outcome.session.review_cycles, 3);
        let answer = outcome.answer.unwrap();
        assert!(answer.converged);
        assert_eq!(answer.answer, "The answer.");
        assert_eq!(outcome.stats.review_cycles, 3);
    }

    #[tokio::test]
    async fn test_exhausts_when_reviewer_never_approves() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(
            vec!["ANALYSIS COMPLETE\nBest effort answer."],
            vec!["VERDICT: REJECTED\nStill not enough."],
        ));

        let orchestrator = Orchestrator::new(config(), session_in(&dir, "task"), backend);
        let outcome = orchestrator.run().await;

        assert_eq!(outcome.session.status, SessionStatus::Exhausted);
        assert_eq!(outcome.session.review_cycles, 3);
        let answer = outcome.answer.unwrap();
        assert!(!answer.converged);
        assert!(!answer.answer.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_command_becomes_observation() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(
            vec![
                "FINDING: exploring\nCOMMAND: find . -delete",
                "ANALYSIS COMPLETE\nDone.",
            ],
            vec!["VERDICT: APPROVED\nFine."],
        ));

        let orchestrator = Orchestrator::new(config(), session_in(&dir, "task"), backend);
        let outcome = orchestrator.run().await;

        assert_eq!(outcome.session.status, SessionStatus::Converged);
        assert_eq!(outcome.stats.commands_rejected, 1);
        // The executor was never invoked for the rejected command.
        assert_eq!(outcome.stats.commands_executed, 0);

        let rejection = outcome.turns.iter().find_map(|t| match t {
            TurnRecord::Observation { rejection, content, .. } => {
                rejection.map(|r| (r, content.clone()))
            }
            _ => None,
        });
        let (reason, content) = rejection.expect("rejection observation recorded");
        assert_eq!(reason, RejectionReason::DisallowedCommand);
        assert!(content.contains("not executed"));
    }

    #[tokio::test]
    async fn test_permitted_command_is_executed_and_observed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "session middleware here\n").unwrap();

        let backend = Arc::new(ScriptedBackend::new(
            vec![
                "FINDING: reading notes\nCOMMAND: cat notes.txt",
                "ANALYSIS COMPLETE\nFound it.",
            ],
            vec!["VERDICT: APPROVED\nGood."],
        ));

        let orchestrator = Orchestrator::new(config(), session_in(&dir, "task"), backend);
        let outcome = orchestrator.run().await;

        assert_eq!(outcome.stats.commands_executed, 1);
        let observed = outcome.turns.iter().any(|t| match t {
            TurnRecord::Observation { content, .. } => content.contains("session middleware here"),
            _ => false,
        });
        assert!(observed, "command output recorded as observation");
    }

    #[tokio::test]
    async fn test_round_cap_forces_review_handoff() {
        let dir = TempDir::new().unwrap();
        // The analyzer never completes and never commands; rounds burn down.
        let backend = Arc::new(ScriptedBackend::new(
            vec!["FINDING: still thinking"],
            vec!["VERDICT: REJECTED\nKeep going."],
        ));

        let orchestrator = Orchestrator::new(config(), session_in(&dir, "task"), backend);
        let outcome = orchestrator.run().await;

        // 3 cycles x 3 rounds, all forced handoffs, then exhaustion.
        assert_eq!(outcome.session.status, SessionStatus::Exhausted);
        assert_eq!(outcome.session.rounds_total, 9);
        assert_eq!(outcome.session.review_cycles, 3);
    }

    #[tokio::test]
    async fn test_backend_failure_escalates_to_failed() {
        let dir = TempDir::new().unwrap();
        let orchestrator =
            Orchestrator::new(config(), session_in(&dir, "task"), Arc::new(DeadBackend));
        let outcome = orchestrator.run().await;

        assert_eq!(outcome.session.status, SessionStatus::Failed);
        assert!(outcome.answer.is_none());
        assert!(outcome.diagnostic.unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_turn_order_preserves_request_response_pairs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();

        let backend = Arc::new(ScriptedBackend::new(
            vec![
                "FINDING: look at a\nCOMMAND: cat a.txt",
                "ANALYSIS COMPLETE\nAnswer.",
            ],
            vec!["VERDICT: APPROVED\nOk."],
        ));

        let orchestrator = Orchestrator::new(config(), session_in(&dir, "task"), backend);
        let outcome = orchestrator.run().await;

        // analyzer, observation, analyzer(complete), reviewer — in order.
        let kinds: Vec<&str> = outcome
            .turns
            .iter()
            .map(|t| match t {
                TurnRecord::Analyzer { .. } => "analyzer",
                TurnRecord::Observation { .. } => "observation",
                TurnRecord::Reviewer { .. } => "reviewer",
            })
            .collect();
        assert_eq!(kinds, vec!["analyzer", "observation", "analyzer", "reviewer"]);
        for (i, turn) in outcome.turns.iter().enumerate() {
            assert_eq!(turn.index() as usize, i);
        }
    }
}
