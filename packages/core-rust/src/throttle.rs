//! Rate-ceiling loop for recurring work.
//!
//! [`Throttler::run`] invokes an action repeatedly, enforcing a minimum delay
//! between the starts of consecutive invocations. Slow iterations are never
//! compensated: when an invocation takes longer than the minimum delay the
//! next one starts immediately and missed periods are dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancel::Cancellation;

/// What the loop does when the invoked action returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop looping and return the error to the caller.
    #[default]
    Propagate,
    /// Log the error, hand it to the error sink if one is set, keep looping.
    Continue,
}

/// Receives errors swallowed under [`ErrorPolicy::Continue`].
pub type ErrorSink = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Counters reported when a throttled loop exits on cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleSummary {
    /// Number of times the action was invoked.
    pub iterations: u64,
    /// Number of invocations that returned an error.
    pub failures: u64,
}

// ---------------------------------------------------------------------------
// Throttler
// ---------------------------------------------------------------------------

/// Invokes an action at most once per `minimum_delay`, until cancelled.
#[derive(Clone)]
pub struct Throttler {
    minimum_delay: Duration,
    cancellation: Cancellation,
    policy: ErrorPolicy,
    error_sink: Option<ErrorSink>,
}

impl Throttler {
    /// Creates a throttler with the [`ErrorPolicy::Propagate`] policy.
    #[must_use]
    pub fn new(minimum_delay: Duration, cancellation: Cancellation) -> Self {
        Self {
            minimum_delay,
            cancellation,
            policy: ErrorPolicy::default(),
            error_sink: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn minimum_delay(&self) -> Duration {
        self.minimum_delay
    }

    #[must_use]
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Runs the loop until cancellation is observed.
    ///
    /// Cancellation is checked before every invocation and interrupts the
    /// throttling sleep immediately. An invocation in progress is never
    /// aborted.
    ///
    /// # Errors
    ///
    /// Under [`ErrorPolicy::Propagate`], returns the first error produced by
    /// `action`; no further invocations happen.
    pub async fn run<F, Fut>(&self, mut action: F) -> anyhow::Result<ThrottleSummary>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut summary = ThrottleSummary::default();

        while !self.cancellation.is_cancelled() {
            let started = Instant::now();
            let result = action().await;
            summary.iterations += 1;

            if let Err(err) = result {
                summary.failures += 1;
                match self.policy {
                    ErrorPolicy::Propagate => return Err(err),
                    ErrorPolicy::Continue => {
                        warn!(error = %err, iteration = summary.iterations, "throttled action failed");
                        if let Some(sink) = &self.error_sink {
                            sink(&err);
                        }
                    }
                }
            }

            let elapsed = started.elapsed();
            if let Some(remaining) = self.minimum_delay.checked_sub(elapsed) {
                if !remaining.is_zero() && !self.cancellation.sleep(remaining).await {
                    debug!("throttle sleep interrupted by cancellation");
                    break;
                }
            }
        }

        Ok(summary)
    }
}

impl std::fmt::Debug for Throttler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttler")
            .field("minimum_delay", &self.minimum_delay)
            .field("policy", &self.policy)
            .field("has_error_sink", &self.error_sink.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
