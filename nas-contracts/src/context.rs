// SPDX-License-Identifier: GPL-3.0-only

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Result, StorageError};

/// Cancellation signal and deadline of the originating request.
///
/// Every adapter call and syscall wrapper receives one of these so that a
/// disconnecting client or an expired request never leaves an external tool
/// running. Cloning shares the same token.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Same token, deadline `timeout` from now (keeps an earlier existing deadline)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    /// Context cancelled together with `self` but also cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fails fast when the request is already cancelled or expired
    pub fn ensure_active(&self, what: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::cancelled(format!("{what}: request cancelled")));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(StorageError::cancelled(format!("{what}: deadline exceeded")));
        }
        Ok(())
    }

    /// Drive `fut` until it completes, the token fires, or the deadline passes.
    /// The future is dropped on cancellation.
    pub async fn run<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.ensure_active(what)?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = self.cancel.cancelled() => {
                Err(StorageError::cancelled(format!("{what}: request cancelled")))
            }
            _ = deadline => {
                Err(StorageError::cancelled(format!("{what}: deadline exceeded")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_future_result() {
        let ctx = OperationContext::new();
        let value = ctx.run("noop", async { Ok(7) }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_pending_future() {
        let ctx = OperationContext::new();
        let child = ctx.child();
        ctx.cancel();
        let result: Result<()> = child
            .run("wait", async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StorageError::Cancelled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_slow_future() {
        let ctx = OperationContext::new().with_timeout(Duration::from_secs(1));
        let result: Result<()> = ctx
            .run("sleep", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StorageError::Cancelled { .. })));
    }

    #[test]
    fn with_timeout_keeps_earlier_deadline() {
        let ctx = OperationContext::new()
            .with_timeout(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(3600));
        assert!(ctx.remaining().is_some_and(|left| left <= Duration::from_secs(1)));
    }
}
