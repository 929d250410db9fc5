//! Steps and the routes that sequence them.
//!
//! A [`Route`] is assembled with chained [`Route::to`] calls and then frozen
//! into an `Arc<Route<T>>`. Once frozen the step list is read-only, and the
//! same route is executed concurrently by any number of exchanges.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::exchange::Exchange;

// ---------------------------------------------------------------------------
// Step trait
// ---------------------------------------------------------------------------

/// A processing unit invoked once per exchange.
///
/// Steps are shared by every exchange running on the route, so `execute`
/// takes `&self`. Any mutable state a step keeps must be synchronized by the
/// step itself.
#[async_trait]
pub trait Step<T: Send + 'static>: Send + Sync + 'static {
    /// Name used in logs and fault reports. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Process the exchange. Returning an error faults the exchange and
    /// skips the remaining steps.
    async fn execute(&self, exchange: &mut Exchange<T>) -> anyhow::Result<()>;

    /// Called once the exchange has settled, if this step was invoked.
    /// Default is a no-op.
    fn on_complete(&self, _exchange: &Exchange<T>) {}
}

// ---------------------------------------------------------------------------
// StepFn (closure adapter)
// ---------------------------------------------------------------------------

/// Adapts a synchronous closure into a [`Step`].
pub struct StepFn<F> {
    name: String,
    f: F,
}

/// Wraps `f` as a named step.
pub fn step_fn<T, F>(name: impl Into<String>, f: F) -> StepFn<F>
where
    T: Send + 'static,
    F: Fn(&mut Exchange<T>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    StepFn {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<T, F> Step<T> for StepFn<F>
where
    T: Send + 'static,
    F: Fn(&mut Exchange<T>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, exchange: &mut Exchange<T>) -> anyhow::Result<()> {
        (self.f)(exchange)
    }
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Named, ordered sequence of steps over payload type `T`.
///
/// Every step consumes and produces `T`, so a step declared for another
/// payload type is rejected at compile time.
pub struct Route<T> {
    name: String,
    steps: Vec<Arc<dyn Step<T>>>,
}

impl<T: Send + 'static> Route<T> {
    /// Creates an empty route.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step and returns the extended route.
    #[must_use]
    pub fn to<S: Step<T>>(mut self, step: S) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Appends a step that is already shared with other routes.
    #[must_use]
    pub fn to_shared(mut self, step: Arc<dyn Step<T>>) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a closure step.
    #[must_use]
    pub fn to_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Exchange<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.to(step_fn(name, f))
    }

    /// Freezes the route for dispatch.
    #[must_use]
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<T> Route<T> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn steps(&self) -> &[Arc<dyn Step<T>>] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<T: Send + 'static> fmt::Debug for Route<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Step<String> for Noop {
        async fn execute(&self, _exchange: &mut Exchange<String>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builder_appends_in_order() {
        let route = Route::<String>::new("files")
            .to_fn("first", |_| Ok(()))
            .to(Noop)
            .to_fn("third", |_| Ok(()));

        assert_eq!(route.name(), "files");
        assert_eq!(route.len(), 3);
        let names: Vec<&str> = route.steps().iter().map(|s| s.name()).collect();
        assert_eq!(names[0], "first");
        assert!(names[1].ends_with("Noop"));
        assert_eq!(names[2], "third");
    }

    #[test]
    fn empty_route() {
        let route = Route::<u32>::new("empty").freeze();
        assert!(route.is_empty());
        assert_eq!(route.len(), 0);
    }

    #[test]
    fn shared_step_can_join_several_routes() {
        let shared: Arc<dyn Step<String>> = Arc::new(Noop);
        let a = Route::new("a").to_shared(Arc::clone(&shared));
        let b = Route::new("b").to_shared(Arc::clone(&shared));
        assert!(Arc::ptr_eq(&a.steps()[0], &b.steps()[0]));
    }

    #[test]
    fn debug_lists_step_names() {
        let route = Route::<String>::new("dbg").to_fn("only", |_| Ok(()));
        let rendered = format!("{route:?}");
        assert!(rendered.contains("dbg"));
        assert!(rendered.contains("only"));
    }
}
