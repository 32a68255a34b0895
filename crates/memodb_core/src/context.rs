//! Cancellation and deadlines for long-running operations.
//!
//! Every public operation takes a [`Context`]. Synchronous code calls
//! [`Context::check`] between steps; futures that can block on I/O are
//! driven through [`Context::run`], which races them against cancellation
//! and the deadline.

use crate::error::{CoreError, CoreResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Carries a cancellation token and an optional deadline.
///
/// Cloning is cheap; clones share the same token.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates a context that is never cancelled and has no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context driven by an existing token.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Returns a copy with a deadline `timeout` from now.
    ///
    /// An earlier existing deadline is kept.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a copy with the given deadline, keeping an earlier one.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Returns a child context: cancelling the parent cancels the child,
    /// but not the other way around.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails with `Cancelled` or `Timeout` if the context is done.
    pub fn check(&self) -> CoreResult<()> {
        if self.token.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CoreError::Timeout),
            _ => Ok(()),
        }
    }

    /// Drives `fut` to completion unless the context is cancelled or its
    /// deadline passes first.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(CoreError::Cancelled.into()),
            () = deadline => Err(CoreError::Timeout.into()),
            res = fut => res,
        }
    }
}
