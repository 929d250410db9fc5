//! Error types for exchange execution and context construction.

/// Failure captured into an exchange when a step does not complete.
///
/// A fault is local to its exchange: it halts the remaining steps of that
/// exchange only and is observed by every completion callback.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeFault {
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("step '{step}' panicked: {message}")]
    StepPanicked { step: String, message: String },
}

impl ExchangeFault {
    /// Name of the step that faulted.
    #[must_use]
    pub fn step(&self) -> &str {
        match self {
            Self::StepFailed { step, .. } | Self::StepPanicked { step, .. } => step,
        }
    }
}

/// Errors from building a [`Context`](crate::Context).
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no tokio runtime available; build the context inside a runtime or supply a handle")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
