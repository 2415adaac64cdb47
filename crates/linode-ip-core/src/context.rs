//! Per-operation deadline and cancellation
//!
//! Every API call the reconciler makes is raced against the context it was
//! given. When the deadline passes or the cancellation signal fires, the
//! in-flight call is dropped and the operation returns immediately.
//!
//! ```rust,no_run
//! use linode_ip_core::OperationContext;
//! use std::time::Duration;
//!
//! let (cancel_tx, ctx) = OperationContext::cancellable();
//! let ctx = ctx.with_timeout(Duration::from_secs(30));
//!
//! // elsewhere, e.g. on Ctrl-C
//! let _ = cancel_tx.send(true);
//! # drop(ctx);
//! ```

use std::future::{Future, pending};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Deadline and cancellation signal shared by the calls of one operation
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl OperationContext {
    /// Context with no deadline and no cancellation
    pub fn background() -> Self {
        Self::default()
    }

    /// Context plus the sender that cancels it (send `true`)
    pub fn cancellable() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (
            tx,
            Self {
                deadline: None,
                cancel: Some(rx),
            },
        )
    }

    /// Attach an existing cancellation receiver
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether cancellation has already been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run one API call under this context
    ///
    /// `op` names the call in the error returned on interruption.
    pub async fn run<T, F>(&self, op: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled(op.to_string()));
        }
        if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(Error::DeadlineExceeded(op.to_string()));
        }

        let cancelled = async {
            match self.cancel.clone() {
                Some(mut rx) => {
                    let sender_gone = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    if sender_gone {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => {
                tracing::debug!(op, "operation cancelled");
                Err(Error::Cancelled(op.to_string()))
            }
            _ = expired => {
                tracing::debug!(op, "operation deadline exceeded");
                Err(Error::DeadlineExceeded(op.to_string()))
            }
            result = call => result,
        }
    }
}
