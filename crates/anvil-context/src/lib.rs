//! The single ambient context threaded into every blocking or suspending
//! call (subprocess spawn, HTTP, sleep/backoff) per spec §5. A cancelled
//! context aborts the nearest blocking call and propagates the cancellation
//! upward; it carries no other payload.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A context that inherits cancellation from `self` but can also be
    /// cancelled independently (e.g. a per-attempt deadline within a retry
    /// loop).
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Races `fut` against cancellation, returning `Err(Cancelled)` if the
    /// context is cancelled first.
    pub async fn race<F, T>(&self, fut: F) -> Result<T, Cancelled>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled),
            out = fut => Ok(out),
        }
    }

    /// A cancellable sleep, used by the workflow retry loop's backoff delay.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.race(tokio::time::sleep(duration)).await
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn race_returns_cancelled_when_token_cancelled_first() {
        let ctx = Context::background();
        ctx.cancel();
        let result = ctx.race(tokio::time::sleep(Duration::from_secs(10))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn race_returns_value_when_not_cancelled() {
        let ctx = Context::background();
        let result = ctx.race(async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn child_cancellation_does_not_propagate_upward() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
