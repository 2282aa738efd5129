//! Language-model backend boundary.
//!
//! The orchestrator only needs a request/response abstraction over the
//! remote completion service; the wire details live in the concrete client.

pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub use ollama::{OllamaBackend, OllamaConfig};

/// One message of the conversation sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Errors from the completion service.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("backend rejected credentials")]
    Unauthorized,
    #[error("backend rate limited the request")]
    RateLimited,
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Transient errors worth retrying with backoff. `Malformed` is handled
    /// by the role adapters instead, so the loop keeps moving.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::RateLimited | BackendError::Unreachable(_))
    }
}

/// Request/response abstraction over the remote completion provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send role instructions plus the conversation so far, returning the
    /// model's free-text completion.
    async fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
    ) -> Result<String, BackendError>;
}

/// Call the backend, retrying transient failures with exponential backoff.
///
/// `max_attempts` bounds the total number of calls; exhausting it returns
/// the last error, which the orchestrator escalates to a failed session.
pub async fn complete_with_retry(
    backend: &dyn CompletionBackend,
    system: &str,
    history: &[ChatMessage],
    max_attempts: u32,
) -> Result<String, BackendError> {
    let mut delay = Duration::from_millis(500);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match backend.complete(system, history).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "backend error, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyBackend {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl CompletionBackend for FlakyBackend {
        async fn complete(
            &self,
            _system: &str,
            _history: &[ChatMessage],
        ) -> Result<String, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(BackendError::Unreachable("connection refused".to_string()))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_errors() {
        let backend = FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 2,
        };
        let result = complete_with_retry(&backend, "sys", &[], 3).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let backend = FlakyBackend {
            calls: AtomicU32::new(0),
            fail_first: 10,
        };
        let result = complete_with_retry(&backend, "sys", &[], 3).await;
        assert!(matches!(result, Err(BackendError::Unreachable(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        struct DenyBackend(AtomicU32);

        #[async_trait]
        impl CompletionBackend for DenyBackend {
            async fn complete(
                &self,
                _system: &str,
                _history: &[ChatMessage],
            ) -> Result<String, BackendError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::Unauthorized)
            }
        }

        let backend = DenyBackend(AtomicU32::new(0));
        let result = complete_with_retry(&backend, "sys", &[], 5).await;
        assert!(matches!(result, Err(BackendError::Unauthorized)));
        assert_eq!(backend.0.load(Ordering::SeqCst), 1);
    }
}
