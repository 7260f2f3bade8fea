//! # Call Context
//!
//! Per-call settings that travel with a single invocation: an optional deadline,
//! a cancellation token and request headers (gRPC metadata).
//!
//! A context is cheap to clone. Clones share the cancellation token, so cancelling
//! any of them cancels every call running under the others.
//!
//! ```rust,no_run
//! # use protocall_core::context::CallContext;
//! # use std::time::Duration;
//! let ctx = CallContext::new()
//!     .with_timeout(Duration::from_secs(5))
//!     .with_header("authorization", "Bearer token");
//!
//! let token = ctx.cancellation_token().clone();
//! // Later, from anywhere:
//! token.cancel();
//! ```
use std::{future::Future, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
    headers: Vec<(String, String)>,
}

/// Why a bounded future stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    DeadlineExceeded,
    Cancelled,
}

impl CallContext {
    /// A context with no deadline, a fresh cancellation token and no headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Replaces the context's cancellation token, e.g. with a child of an application
    /// wide shutdown token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Adds a request header. Headers are sent in insertion order.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, zero once it has passed. `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Drives `future` until it completes, the deadline passes or the context is
    /// cancelled, whichever happens first.
    ///
    /// Cancellation is checked before the deadline, and both before the future is
    /// polled, so an already cancelled or expired context never starts the work.
    pub(crate) async fn bound<F: Future>(&self, future: F) -> Result<F::Output, Interrupted> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            _ = self.cancellation.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            output = future => Ok(output),
        }
    }
}
