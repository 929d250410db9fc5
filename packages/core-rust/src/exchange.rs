//! Exchange: one unit of work binding a message to a route.
//!
//! Execution drives the route's steps strictly in order, short-circuits on
//! the first fault, then drains the completion callbacks in LIFO order.
//!
//! State machine: Created -> Executing -> (Completed | Faulted) ->
//! CallbacksDrained -> Done

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::context::{Context, ContextShared};
use crate::error::{panic_message, ExchangeFault};
use crate::message::Message;
use crate::route::Route;

/// Hook invoked once after an exchange settles, successfully or not.
pub type CompletionCallback<T> = Box<dyn FnOnce(&Exchange<T>) + Send>;

/// Lifecycle state of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Bound to a route and message, not yet executed.
    Created,
    /// Steps are running.
    Executing,
    /// Every step ran without a fault.
    Completed,
    /// A step faulted and the remaining steps were skipped.
    Faulted,
    /// All completion callbacks have run.
    CallbacksDrained,
    /// Execution finished; the exchange can be dropped.
    Done,
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// A message travelling through a route.
///
/// Owns its message for its whole lifetime. The context reference is weak:
/// it grants scheduling capability without keeping the context alive.
pub struct Exchange<T> {
    route: Arc<Route<T>>,
    message: Message<T>,
    fault: Option<ExchangeFault>,
    start_time: Instant,
    state: ExchangeState,
    callbacks: Vec<CompletionCallback<T>>,
    context: Weak<ContextShared>,
}

impl<T: Send + 'static> Exchange<T> {
    /// Creates a detached exchange with no context back-reference.
    #[must_use]
    pub fn new(route: Arc<Route<T>>, message: Message<T>) -> Self {
        Self::bound(route, message, Weak::new())
    }

    pub(crate) fn bound(
        route: Arc<Route<T>>,
        message: Message<T>,
        context: Weak<ContextShared>,
    ) -> Self {
        Self {
            route,
            message,
            fault: None,
            start_time: Instant::now(),
            state: ExchangeState::Created,
            callbacks: Vec::new(),
            context,
        }
    }

    /// Pushes a completion callback. Callbacks run in reverse order of
    /// registration after the steps finish.
    pub fn push_completion<F>(&mut self, callback: F)
    where
        F: FnOnce(&Exchange<T>) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub(crate) fn push_boxed_completion(&mut self, callback: CompletionCallback<T>) {
        self.callbacks.push(callback);
    }

    /// Builder-style variant of [`push_completion`](Self::push_completion).
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Exchange<T>) + Send + 'static,
    {
        self.push_completion(callback);
        self
    }

    /// Runs the route's steps and drains the completion callbacks.
    ///
    /// A step that returns an error or panics faults the exchange; later
    /// steps are skipped. Callbacks always run, each exactly once, and see
    /// the final fault state. Returns the settled exchange.
    pub async fn execute(mut self) -> Self {
        self.state = ExchangeState::Executing;
        let route = Arc::clone(&self.route);
        debug!(
            route = route.name(),
            exchange_id = %self.message.id(),
            steps = route.len(),
            "exchange started"
        );

        for step in route.steps() {
            let hook = Arc::clone(step);
            self.callbacks
                .push(Box::new(move |exchange: &Exchange<T>| hook.on_complete(exchange)));

            let outcome = AssertUnwindSafe(step.execute(&mut self))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => debug!(step = step.name(), "step completed"),
                Ok(Err(source)) => {
                    self.fault = Some(ExchangeFault::StepFailed {
                        step: step.name().to_string(),
                        source,
                    });
                    break;
                }
                Err(payload) => {
                    self.fault = Some(ExchangeFault::StepPanicked {
                        step: step.name().to_string(),
                        message: panic_message(payload.as_ref()),
                    });
                    break;
                }
            }
        }

        self.state = if self.fault.is_some() {
            ExchangeState::Faulted
        } else {
            ExchangeState::Completed
        };

        self.drain_callbacks();
        self.state = ExchangeState::CallbacksDrained;
        self.record_outcome();
        self.state = ExchangeState::Done;
        self
    }

    fn drain_callbacks(&mut self) {
        while let Some(callback) = self.callbacks.pop() {
            let exchange: &Exchange<T> = self;
            if let Err(payload) =
                std::panic::catch_unwind(AssertUnwindSafe(|| callback(exchange)))
            {
                error!(
                    route = self.route.name(),
                    exchange_id = %self.message.id(),
                    panic = %panic_message(payload.as_ref()),
                    "completion callback panicked"
                );
            }
        }
    }

    fn record_outcome(&self) {
        let duration = self.elapsed();
        let route = self.route.name().to_string();
        let outcome = if self.is_faulted() { "faulted" } else { "completed" };

        metrics::counter!("courier_exchanges_total", "route" => route.clone(), "outcome" => outcome)
            .increment(1);
        metrics::histogram!("courier_exchange_duration_seconds", "route" => route)
            .record(duration.as_secs_f64());

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = duration.as_millis() as u64;
        match &self.fault {
            None => info!(
                route = self.route.name(),
                exchange_id = %self.message.id(),
                duration_ms,
                "exchange completed"
            ),
            Some(fault) => warn!(
                route = self.route.name(),
                exchange_id = %self.message.id(),
                duration_ms,
                fault = %fault,
                "exchange faulted"
            ),
        }
    }
}

impl<T> Exchange<T> {
    #[must_use]
    pub fn route(&self) -> &Arc<Route<T>> {
        &self.route
    }

    #[must_use]
    pub fn message(&self) -> &Message<T> {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message<T> {
        &mut self.message
    }

    /// Consumes the exchange and returns its message.
    pub fn into_message(self) -> Message<T> {
        self.message
    }

    /// The captured fault, if a step failed.
    #[must_use]
    pub fn fault(&self) -> Option<&ExchangeFault> {
        self.fault.as_ref()
    }

    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    #[must_use]
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Time since the exchange was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// The owning context, if it is still alive.
    #[must_use]
    pub fn context(&self) -> Option<Context> {
        self.context.upgrade().map(Context::from_shared)
    }

    /// Number of callbacks waiting to run.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }
}

impl<T> fmt::Debug for Exchange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("route", &self.route.name())
            .field("message_id", &self.message.id())
            .field("state", &self.state)
            .field("fault", &self.fault)
            .field("pending_callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
