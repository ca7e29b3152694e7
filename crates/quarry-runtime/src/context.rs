//! Caller-side control over a running acquisition.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus an optional deadline.
///
/// Cancelling the token, or reaching the deadline, stops the orchestrator:
/// the in-flight provider call and any pending backoff sleep are dropped,
/// and the provider is recorded as `cancelled`.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a token owned by the caller.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Give up after `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }

    /// Resolves once the token is cancelled or the deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Why the request stopped, for attempt records.
    pub fn reason(&self) -> &'static str {
        if self.token.is_cancelled() {
            "cancelled by caller"
        } else {
            "request deadline exceeded"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_cancellation() {
        let ctx = RequestContext::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
        ctx.cancelled().await;
        assert_eq!(ctx.reason(), "cancelled by caller");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancellation() {
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(2));
        assert!(!ctx.is_cancelled());
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.reason(), "request deadline exceeded");
    }

    #[tokio::test]
    async fn test_clones_share_the_token() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
    }
}
