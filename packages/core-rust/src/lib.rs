//! Courier core: messages, routes, exchanges, the routing context and
//! throttled polling.

pub mod cancel;
pub mod context;
pub mod error;
pub mod exchange;
pub mod message;
pub mod producer;
pub mod route;
pub mod throttle;

pub use cancel::{Cancellation, CancellationSignal};
pub use context::{
    Context, ContextBuilder, ContextConfig, ContextState, ExceptionHook, ShutdownReport, TaskId,
};
pub use error::{ContextError, ExchangeFault};
pub use exchange::{CompletionCallback, Exchange, ExchangeState};
pub use message::{Message, MessageId, Metadata};
pub use producer::{Poller, Producer};
pub use route::{step_fn, Route, Step, StepFn};
pub use throttle::{ErrorPolicy, ErrorSink, ThrottleSummary, Throttler};
