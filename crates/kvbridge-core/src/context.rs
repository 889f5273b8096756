//! Request contexts: a deadline plus a set of cancellation signals.
//!
//! Every cache operation takes a [`Context`] and runs the network round trip
//! through [`Context::run`], which fails the call as soon as the context is
//! cancelled or its deadline passes.

use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CacheError;

/// Cancellable, deadline-bearing execution context.
///
/// Contexts are cheap to clone. Deriving a child never affects the parent,
/// while cancelling a parent reaches every child derived from it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    signals: Vec<watch::Receiver<bool>>,
}

/// Cancels the context returned alongside it by [`Context::with_cancel`].
///
/// Dropping the handle without calling [`CancelHandle::cancel`] leaves the
/// context live.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// A context with no deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child that expires `timeout` from now, or at the parent's
    /// deadline if that comes first.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, at: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(at),
            None => at,
        };

        Self {
            deadline: Some(deadline),
            signals: self.signals.clone(),
        }
    }

    /// Derive a child together with the handle that cancels it.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut child = self.clone();
        child.signals.push(rx);
        (child, CancelHandle { tx })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.iter().any(|rx| *rx.borrow())
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    /// Resolves once any cancellation signal of this context fires.
    pub async fn cancelled(&self) {
        if self.signals.is_empty() {
            return future::pending().await;
        }

        let waits = self.signals.iter().cloned().map(|mut rx| {
            async move {
                // A dropped handle can no longer cancel.
                let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                if closed {
                    future::pending::<()>().await;
                }
            }
            .boxed()
        });

        future::select_all(waits).await;
    }

    /// Run `op` under this context.
    ///
    /// Fails with [`CacheError::Cancelled`] or [`CacheError::DeadlineExceeded`]
    /// without polling `op` when the context is already done, and drops `op`
    /// mid-flight when the context ends first.
    pub async fn run<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        if self.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        if self.is_expired() {
            return Err(CacheError::DeadlineExceeded);
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(CacheError::Cancelled),
            _ = deadline => Err(CacheError::DeadlineExceeded),
            result = op => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn slow_ok(delay: Duration) -> Result<u32, CacheError> {
        tokio::time::sleep(delay).await;
        Ok(7)
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.run(slow_ok(Duration::from_secs(60))).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_interrupts_operation() {
        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let err = ctx.run(slow_ok(Duration::from_secs(1))).await.unwrap_err();
        assert!(matches!(err, CacheError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_context_fails_before_polling() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));

        let polled = AtomicBool::new(false);
        let err = ctx
            .run(async {
                polled.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::DeadlineExceeded));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.with_timeout(Duration::from_millis(5));
        assert!(tighter.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_run() {
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();

        assert!(ctx.is_cancelled());
        let err = ctx.run(slow_ok(Duration::ZERO)).await.unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_run() {
        let (ctx, handle) = Context::background().with_cancel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let err = ctx.run(slow_ok(Duration::from_secs(5))).await.unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_reaches_child() {
        let (parent, handle) = Context::background().with_cancel();
        let (child, _child_handle) = parent.with_timeout(Duration::from_secs(1)).with_cancel();

        handle.cancel();
        assert!(child.is_cancelled());

        let err = child.run(slow_ok(Duration::from_secs(5))).await.unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_cancel_leaves_parent_alone() {
        let parent = Context::background();
        let (_child, handle) = parent.with_cancel();
        handle.cancel();

        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::background().with_cancel();
        drop(handle);

        assert_eq!(ctx.run(slow_ok(Duration::from_millis(10))).await.unwrap(), 7);
    }
}
