//! Cancellable, deadline-bearing execution context.
//!
//! Every engine operation takes a [`Context`]. Cancelling it, or letting its deadline
//! elapse, makes in-flight operations return [`DocumentStoreError::Cancelled`] or
//! [`DocumentStoreError::DeadlineExceeded`] instead of hanging.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{DocumentStoreError, DocumentStoreResult};

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled by anyone else and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a child context that is cancelled with its parent, or on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;

        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(match self.deadline {
                Some(parent) if parent < deadline => parent,
                _ => deadline,
            }),
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the interruption if the context is already cancelled or expired.
    pub fn err(&self) -> Option<DocumentStoreError> {
        if self.cancel.is_cancelled() {
            return Some(DocumentStoreError::Cancelled);
        }

        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(DocumentStoreError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline elapses.
    pub async fn done(&self) -> DocumentStoreError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => DocumentStoreError::Cancelled,
                _ = sleep_until(deadline) => DocumentStoreError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                DocumentStoreError::Cancelled
            }
        }
    }

    /// Drives `future` to completion unless the context is interrupted first.
    pub async fn run<F, T>(&self, future: F) -> DocumentStoreResult<T>
    where
        F: Future<Output = DocumentStoreResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = future => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_completes_when_not_interrupted() {
        let ctx = Context::background();
        assert_eq!(ctx.run(async { Ok(7) }).await, Ok(7));
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = Context::background();
        let child = parent.child();

        parent.cancel();

        assert!(child.is_cancelled());
        let result = child.run(std::future::pending::<DocumentStoreResult<()>>()).await;
        assert_eq!(result, Err(DocumentStoreError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_pending_work() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let result = ctx.run(std::future::pending::<DocumentStoreResult<()>>()).await;
        assert_eq!(result, Err(DocumentStoreError::DeadlineExceeded));
        assert_eq!(ctx.err(), Some(DocumentStoreError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn child_keeps_the_earlier_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
