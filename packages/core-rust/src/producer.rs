//! Producers and the poller that drives them.
//!
//! A [`Producer`] discovers inputs and dispatches one exchange per input
//! through the context. A [`Poller`] invokes a producer under a
//! [`Throttler`] until cancellation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{debug, info};

use crate::error::panic_message;
use crate::throttle::{ThrottleSummary, Throttler};

// ---------------------------------------------------------------------------
// Producer trait
// ---------------------------------------------------------------------------

/// Manufactures exchanges from some input source.
///
/// `execute` should only enumerate inputs and hand each exchange to
/// [`Context::start`](crate::Context::start); pipeline work runs on the pool,
/// never inside this call. Finding nothing is `Ok(())`. An error fails the
/// current cycle only.
#[async_trait]
pub trait Producer: Send + Sync + 'static {
    /// Name used in logs. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn execute(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<P: Producer + ?Sized> Producer for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn execute(&self) -> anyhow::Result<()> {
        (**self).execute().await
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Long-running loop that invokes a producer at a throttled rate.
pub struct Poller<P> {
    producer: P,
    throttler: Throttler,
}

impl<P: Producer> Poller<P> {
    #[must_use]
    pub fn new(producer: P, throttler: Throttler) -> Self {
        Self {
            producer,
            throttler,
        }
    }

    #[must_use]
    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Polls until cancelled.
    ///
    /// A panicking cycle is turned into an error for that cycle, so the
    /// throttler's policy decides whether polling goes on.
    ///
    /// # Errors
    ///
    /// Returns a producer error only when the throttler's policy is
    /// [`ErrorPolicy::Propagate`](crate::ErrorPolicy::Propagate).
    pub async fn run(&self) -> anyhow::Result<ThrottleSummary> {
        let name = self.producer.name();
        info!(
            producer = name,
            minimum_delay_ms = u64::try_from(self.throttler.minimum_delay().as_millis())
                .unwrap_or(u64::MAX),
            "poller started"
        );

        let producer = &self.producer;
        let summary = self
            .throttler
            .run(|| async move {
                debug!(producer = name, "poll cycle");
                match AssertUnwindSafe(producer.execute()).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Err(anyhow::anyhow!(
                        "producer '{name}' panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                }
            })
            .await?;

        info!(
            producer = name,
            iterations = summary.iterations,
            failures = summary.failures,
            "poller stopped"
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
