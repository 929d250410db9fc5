//! Process-wide routing context.
//!
//! The [`Context`] owns the cancellation signal and the handle to the shared
//! execution pool (a tokio runtime). It creates exchanges, dispatches them
//! fire-and-forget, and tracks long-running registrations (pollers and
//! background tasks) so that [`Context::shutdown`] can wait for them.
//!
//! Lifecycle: Running -> Stopping -> Stopped
//!
//! Exchanges are never tracked. They hold only a weak reference back to the
//! context, so dispatch creates no reference cycle.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::cancel::{Cancellation, CancellationSignal};
use crate::error::ContextError;
use crate::exchange::{CompletionCallback, Exchange};
use crate::message::Message;
use crate::producer::{Poller, Producer};
use crate::route::Route;
use crate::throttle::{ErrorPolicy, Throttler};

/// Global hook receiving errors from registered tasks and recurring
/// producers.
pub type ExceptionHook = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for a [`Context`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Name recorded on the context span and in logs.
    pub name: String,
    /// How long [`Context::shutdown`] waits for registered tasks.
    pub shutdown_timeout: Duration,
    /// Error policy applied to producers registered with
    /// [`Context::register_recurring`].
    pub recurring_error_policy: ErrorPolicy,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            name: "courier".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            recurring_error_policy: ErrorPolicy::Continue,
        }
    }
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Accepting registrations and dispatching exchanges.
    Running,
    /// Cancellation raised; waiting for registered tasks.
    Stopping,
    /// Shutdown finished.
    Stopped,
}

/// Identifier of a registered long-running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

/// Outcome of [`Context::shutdown`], by task name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that exited before the deadline.
    pub finished: Vec<String>,
    /// Tasks that panicked.
    pub failed: Vec<String>,
    /// Tasks still running when the deadline expired. They are detached,
    /// not aborted.
    pub timed_out: Vec<String>,
}

impl ShutdownReport {
    /// True when every registered task exited in time.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct TaskEntry {
    name: String,
    handle: JoinHandle<()>,
}

pub(crate) struct ContextShared {
    config: ContextConfig,
    runtime: Handle,
    signal: CancellationSignal,
    exception_hook: Option<ExceptionHook>,
    tasks: DashMap<TaskId, TaskEntry>,
    next_task_id: AtomicU64,
    state: ArcSwap<ContextState>,
    span: Span,
}

// ---------------------------------------------------------------------------
// ContextBuilder
// ---------------------------------------------------------------------------

/// Assembles a [`Context`].
#[derive(Default)]
pub struct ContextBuilder {
    config: ContextConfig,
    span: Option<Span>,
    exception_hook: Option<ExceptionHook>,
    runtime: Option<Handle>,
}

impl ContextBuilder {
    #[must_use]
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Logging span every exchange and registered task is parented under.
    /// Defaults to a fresh `context` span.
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub fn exception_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&anyhow::Error) + Send + Sync + 'static,
    {
        self.exception_hook = Some(Arc::new(hook));
        self
    }

    /// Runtime used as the execution pool. Defaults to the current runtime.
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NoRuntime`] when no runtime handle was supplied
    /// and the caller is not inside a tokio runtime.
    pub fn build(self) -> Result<Context, ContextError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()?,
        };
        let span = self
            .span
            .unwrap_or_else(|| info_span!("context", name = %self.config.name));

        info!(parent: &span, name = %self.config.name, "context started");

        Ok(Context {
            shared: Arc::new(ContextShared {
                config: self.config,
                runtime,
                signal: CancellationSignal::new(),
                exception_hook: self.exception_hook,
                tasks: DashMap::new(),
                next_task_id: AtomicU64::new(1),
                state: ArcSwap::from_pointee(ContextState::Running),
                span,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Cheap-to-clone handle to the process-wide routing context.
#[derive(Clone)]
pub struct Context {
    shared: Arc<ContextShared>,
}

impl Context {
    /// Builds a context with default settings on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NoRuntime`] outside a tokio runtime.
    pub fn new() -> Result<Self, ContextError> {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub(crate) fn from_shared(shared: Arc<ContextShared>) -> Self {
        Self { shared }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.shared.config
    }

    /// The injected logging span. Components log under it via
    /// `tracing::Instrument` or `span().in_scope(..)`.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.shared.span
    }

    #[must_use]
    pub fn state(&self) -> ContextState {
        **self.shared.state.load()
    }

    /// Starts a new, empty route.
    #[must_use]
    pub fn route<T: Send + 'static>(&self, name: impl Into<String>) -> Route<T> {
        Route::new(name)
    }

    /// Binds a message to a frozen route, optionally pushing one completion
    /// callback.
    #[must_use]
    pub fn create_exchange<T: Send + 'static>(
        &self,
        route: &Arc<Route<T>>,
        message: Message<T>,
        on_complete: Option<CompletionCallback<T>>,
    ) -> Exchange<T> {
        let mut exchange = Exchange::bound(Arc::clone(route), message, Arc::downgrade(&self.shared));
        if let Some(callback) = on_complete {
            exchange.push_boxed_completion(callback);
        }
        exchange
    }

    /// Dispatches the exchange onto the pool and returns immediately.
    ///
    /// The exchange is not tracked: shutdown neither waits for nor aborts it.
    pub fn start<T: Send + 'static>(&self, exchange: Exchange<T>) {
        let span = self.exchange_span(&exchange);
        self.shared.runtime.spawn(exchange.execute().instrument(span));
    }

    /// Runs the exchange on the caller's task and returns it settled.
    pub async fn execute<T: Send + 'static>(&self, exchange: Exchange<T>) -> Exchange<T> {
        let span = self.exchange_span(&exchange);
        exchange.execute().instrument(span).await
    }

    fn exchange_span<T>(&self, exchange: &Exchange<T>) -> Span {
        info_span!(
            parent: &self.shared.span,
            "exchange",
            route = exchange.route().name(),
            exchange_id = %exchange.message().id()
        )
    }

    /// Spawns and tracks a long-running unit of work.
    ///
    /// An error returned by `task` is passed to [`report_error`](Self::report_error).
    pub fn register<F>(&self, name: impl Into<String>, task: F) -> TaskId
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let id = TaskId(self.shared.next_task_id.fetch_add(1, Ordering::Relaxed));
        let span = info_span!(parent: &self.shared.span, "task", task = %name, task_id = id.0);
        let context = Arc::downgrade(&self.shared);

        let handle = self.shared.runtime.spawn(
            async move {
                debug!("registered task started");
                match task.await {
                    Ok(()) => debug!("registered task finished"),
                    Err(err) => {
                        if let Some(shared) = context.upgrade() {
                            Context::from_shared(shared).report_error(&err);
                        } else {
                            error!(error = %err, "registered task failed");
                        }
                    }
                }
            }
            .instrument(span),
        );

        self.shared.tasks.retain(|_, entry| !entry.handle.is_finished());
        self.shared.tasks.insert(id, TaskEntry { name, handle });
        id
    }

    /// Registers `producer` to be polled at most once per `minimum_delay`
    /// until cancellation.
    ///
    /// Producer errors follow [`ContextConfig::recurring_error_policy`]; under
    /// the default `Continue` policy a failing cycle is reported to the
    /// exception hook and the poller keeps running.
    pub fn register_recurring<P: Producer>(
        &self,
        name: impl Into<String>,
        minimum_delay: Duration,
        producer: P,
    ) -> TaskId {
        let mut throttler = Throttler::new(minimum_delay, self.cancellation())
            .with_policy(self.shared.config.recurring_error_policy);
        if let Some(hook) = &self.shared.exception_hook {
            throttler = throttler.with_error_sink(Arc::clone(hook));
        }

        let poller = Poller::new(producer, throttler);
        self.register(name, async move { poller.run().await.map(|_| ()) })
    }

    /// Number of registered tasks that have not exited yet.
    #[must_use]
    pub fn registered_tasks(&self) -> usize {
        self.shared
            .tasks
            .iter()
            .filter(|entry| !entry.handle.is_finished())
            .count()
    }

    /// Observe-only view of the cancellation signal.
    #[must_use]
    pub fn cancellation(&self) -> Cancellation {
        self.shared.signal.observer()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.signal.is_cancelled()
    }

    /// Raises the cancellation signal. Idempotent.
    pub fn cancel(&self) {
        if self.shared.signal.cancel() {
            info!(parent: &self.shared.span, "cancellation raised");
        }
    }

    /// Logs `err` and forwards it to the exception hook, if one is set.
    pub fn report_error(&self, err: &anyhow::Error) {
        error!(parent: &self.shared.span, error = %err, "unhandled error");
        if let Some(hook) = &self.shared.exception_hook {
            hook(err);
        }
    }

    /// Raises cancellation and waits for registered tasks to exit, up to
    /// [`ContextConfig::shutdown_timeout`].
    ///
    /// In-flight exchanges are left to finish on their own.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shared.state.store(Arc::new(ContextState::Stopping));
        self.cancel();

        let deadline = tokio::time::Instant::now() + self.shared.config.shutdown_timeout;
        let ids: Vec<TaskId> = self.shared.tasks.iter().map(|entry| *entry.key()).collect();
        let mut report = ShutdownReport::default();

        for id in ids {
            let Some((_, TaskEntry { name, mut handle })) = self.shared.tasks.remove(&id) else {
                continue;
            };
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.finished.push(name),
                Ok(Err(join_err)) => {
                    warn!(parent: &self.shared.span, task = %name, error = %join_err, "registered task panicked");
                    report.failed.push(name);
                }
                Err(_elapsed) => {
                    warn!(parent: &self.shared.span, task = %name, "registered task still running at shutdown deadline");
                    report.timed_out.push(name);
                }
            }
        }

        self.shared.state.store(Arc::new(ContextState::Stopped));
        info!(
            parent: &self.shared.span,
            finished = report.finished.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out.len(),
            "context stopped"
        );
        report
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .field("registered_tasks", &self.registered_tasks())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::message::MessageId;
    use crate::route::Step;

    /// Dispatches one exchange per queued item and reports each outcome on a
    /// channel.
    struct ListProducer {
        ctx: Context,
        route: Arc<Route<String>>,
        items: Vec<String>,
        created: AtomicU32,
        results: mpsc::UnboundedSender<(MessageId, String, bool)>,
    }

    #[async_trait]
    impl Producer for ListProducer {
        fn name(&self) -> &str {
            "list"
        }

        async fn execute(&self) -> anyhow::Result<()> {
            for item in &self.items {
                let results = self.results.clone();
                let exchange = self.ctx.create_exchange(
                    &self.route,
                    Message::new(item.clone()),
                    Some(Box::new(move |ex: &Exchange<String>| {
                        let _ = results.send((
                            ex.message().id(),
                            ex.message().content().clone(),
                            ex.is_faulted(),
                        ));
                    })),
                );
                self.created.fetch_add(1, Ordering::SeqCst);
                self.ctx.start(exchange);
            }
            Ok(())
        }
    }

    /// Sleeps, then uppercases the payload.
    struct SlowUpper(Duration);

    #[async_trait]
    impl Step<String> for SlowUpper {
        async fn execute(&self, exchange: &mut Exchange<String>) -> anyhow::Result<()> {
            tokio::time::sleep(self.0).await;
            let upper = exchange.message().content().to_uppercase();
            exchange.message_mut().set_content(upper);
            Ok(())
        }
    }

    struct CountingProducer(Arc<AtomicU32>);

    #[async_trait]
    impl Producer for CountingProducer {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn build_outside_runtime_fails() {
        assert!(matches!(Context::new(), Err(ContextError::NoRuntime(_))));
    }

    #[test]
    fn build_with_explicit_runtime_handle() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let ctx = Context::builder()
            .runtime(rt.handle().clone())
            .config(ContextConfig {
                name: "explicit".to_string(),
                ..ContextConfig::default()
            })
            .build()
            .unwrap();
        assert_eq!(ctx.name(), "explicit");
        assert_eq!(ctx.state(), ContextState::Running);
    }

    #[test]
    fn config_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.name, "courier");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.recurring_error_policy, ErrorPolicy::Continue);
    }

    #[tokio::test]
    async fn exchange_holds_weak_back_reference() {
        let ctx = Context::new().unwrap();
        let route = ctx.route::<String>("weak").freeze();
        let exchange = ctx.create_exchange(&route, Message::new("x".to_string()), None);

        assert_eq!(exchange.context().map(|c| c.name().to_string()), Some("courier".to_string()));
        drop(ctx);
        assert!(exchange.context().is_none());
    }

    #[tokio::test]
    async fn execute_runs_inline_and_returns_settled_exchange() {
        let ctx = Context::new().unwrap();
        let route = ctx
            .route::<String>("inline")
            .to_fn("suffix", |ex| {
                ex.message_mut().content_mut().push_str("-A");
                Ok(())
            })
            .freeze();
        let done = ctx
            .execute(ctx.create_exchange(&route, Message::new("hi".to_string()), None))
            .await;
        assert_eq!(done.message().content(), "hi-A");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn producer_cycle_fans_out_independent_exchanges() {
        let ctx = Context::new().unwrap();
        let route = ctx
            .route::<String>("fan-out")
            .to(SlowUpper(Duration::from_millis(20)))
            .freeze();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let producer = ListProducer {
            ctx: ctx.clone(),
            route,
            items: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            created: AtomicU32::new(0),
            results: tx,
        };

        producer.execute().await.unwrap();
        assert_eq!(producer.created.load(Ordering::SeqCst), 3);
        // Exchanges are dispatched, never tracked.
        assert_eq!(ctx.registered_tasks(), 0);

        let mut seen = HashMap::new();
        for _ in 0..3 {
            let (id, content, faulted) = rx.recv().await.unwrap();
            assert!(!faulted);
            seen.insert(id, content);
        }
        let mut contents: Vec<String> = seen.into_values().collect();
        contents.sort();
        assert_eq!(contents, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn empty_cycle_creates_nothing() {
        let ctx = Context::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let producer = ListProducer {
            ctx: ctx.clone(),
            route: ctx.route::<String>("empty").freeze(),
            items: Vec::new(),
            created: AtomicU32::new(0),
            results: tx,
        };

        assert!(producer.execute().await.is_ok());
        assert_eq!(producer.created.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_exchanges_do_not_share_messages() {
        let ctx = Context::new().unwrap();
        let route = ctx
            .route::<String>("isolation")
            .to_fn("tag", |ex| {
                let id = ex.message().id();
                ex.message_mut().add_metadata(id);
                Ok(())
            })
            .to(SlowUpper(Duration::from_millis(5)))
            .freeze();

        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..16 {
            let tx = tx.clone();
            let exchange = ctx.create_exchange(
                &route,
                Message::new(format!("item-{i}")),
                Some(Box::new(move |ex: &Exchange<String>| {
                    let tags: Vec<MessageId> =
                        ex.message().query_metadata::<MessageId>().copied().collect();
                    let _ = tx.send((ex.message().id(), tags, ex.message().content().clone()));
                })),
            );
            ctx.start(exchange);
        }
        drop(tx);

        let mut count = 0;
        while let Some((id, tags, content)) = rx.recv().await {
            assert_eq!(tags, vec![id]);
            assert!(content.starts_with("ITEM-"));
            count += 1;
        }
        assert_eq!(count, 16);
    }

    #[tokio::test]
    async fn recurring_producer_stops_on_shutdown() {
        let ctx = Context::builder()
            .config(ContextConfig {
                shutdown_timeout: Duration::from_secs(5),
                ..ContextConfig::default()
            })
            .build()
            .unwrap();
        let cycles = Arc::new(AtomicU32::new(0));
        ctx.register_recurring(
            "counting",
            Duration::from_millis(10),
            CountingProducer(Arc::clone(&cycles)),
        );
        assert_eq!(ctx.registered_tasks(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = ctx.shutdown().await;

        assert!(report.is_clean());
        assert_eq!(report.finished, vec!["counting".to_string()]);
        assert_eq!(ctx.state(), ContextState::Stopped);
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.registered_tasks(), 0);

        let after = cycles.load(Ordering::SeqCst);
        assert!(after >= 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn failing_task_reaches_exception_hook() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let ctx = Context::builder()
            .exception_hook(move |err| sink.lock().push(err.to_string()))
            .build()
            .unwrap();

        ctx.register("doomed", async {
            Err::<(), _>(anyhow::anyhow!("precondition failed"))
        });
        let report = ctx.shutdown().await;

        assert_eq!(report.finished, vec!["doomed".to_string()]);
        assert_eq!(*reported.lock(), vec!["precondition failed".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_failures_reach_hook_without_stopping_poller() {
        struct Failing(Arc<AtomicU32>);

        #[async_trait]
        impl Producer for Failing {
            async fn execute(&self) -> anyhow::Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("folder missing")
            }
        }

        let reported = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&reported);
        let ctx = Context::builder()
            .exception_hook(move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let cycles = Arc::new(AtomicU32::new(0));
        ctx.register_recurring(
            "failing",
            Duration::from_millis(100),
            Failing(Arc::clone(&cycles)),
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        let report = ctx.shutdown().await;

        assert!(report.is_clean());
        assert!(cycles.load(Ordering::SeqCst) >= 3);
        assert_eq!(reported.load(Ordering::SeqCst), cycles.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_cycle_does_not_kill_recurring_producer() {
        struct PanicsOnce(Arc<AtomicU32>);

        #[async_trait]
        impl Producer for PanicsOnce {
            async fn execute(&self) -> anyhow::Result<()> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first cycle exploded");
                }
                Ok(())
            }
        }

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let ctx = Context::builder()
            .exception_hook(move |err| sink.lock().push(err.to_string()))
            .build()
            .unwrap();
        let cycles = Arc::new(AtomicU32::new(0));
        ctx.register_recurring("p", Duration::from_millis(10), PanicsOnce(Arc::clone(&cycles)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let report = ctx.shutdown().await;

        assert!(cycles.load(Ordering::SeqCst) > 1, "poller stopped after the panic");
        assert_eq!(report.finished, vec!["p".to_string()]);
        assert!(report.is_clean());
        let reported = reported.lock();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains("first cycle exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_tasks_ignoring_cancellation() {
        let ctx = Context::builder()
            .config(ContextConfig {
                shutdown_timeout: Duration::from_millis(50),
                ..ContextConfig::default()
            })
            .build()
            .unwrap();
        ctx.register("stubborn", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            anyhow::Ok(())
        });

        let report = ctx.shutdown().await;
        assert_eq!(report.timed_out, vec!["stubborn".to_string()]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn shutdown_does_not_abort_in_flight_exchanges() {
        let ctx = Context::new().unwrap();
        let route = ctx
            .route::<String>("in-flight")
            .to(SlowUpper(Duration::from_millis(30)))
            .freeze();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let exchange = ctx.create_exchange(
            &route,
            Message::new("late".to_string()),
            Some(Box::new(move |ex: &Exchange<String>| {
                let _ = tx.send((ex.message().content().clone(), ex.is_faulted()));
            })),
        );

        ctx.start(exchange);
        let report = ctx.shutdown().await;
        assert!(report.is_clean());

        let (content, faulted) = rx.recv().await.unwrap();
        assert_eq!(content, "LATE");
        assert!(!faulted);
    }
}
