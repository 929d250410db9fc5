//! Cooperative cancellation signal.
//!
//! One [`CancellationSignal`] is owned by the context and raised once at
//! teardown. Collaborators only ever hold a [`Cancellation`] observer, which
//! can be polled at loop boundaries or awaited alongside a sleep.

use std::time::Duration;

use tokio::sync::watch;

/// Broadcast-only cancellation flag. Raised at most once, never reset.
#[derive(Debug)]
pub struct CancellationSignal {
    tx: watch::Sender<bool>,
}

impl CancellationSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Raises the signal. Returns `true` if this call raised it, `false` if
    /// it was already raised.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns an observe-only view of this signal.
    #[must_use]
    pub fn observer(&self) -> Cancellation {
        Cancellation {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Observe-only handle to a [`CancellationSignal`].
///
/// A dropped signal counts as cancelled, so observers never outlive the
/// owner waiting for a flag that can no longer be raised.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the signal is raised (or its owner is dropped).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err means the sender is gone, which counts as cancellation.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleeps for `duration` unless cancellation fires first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the sleep was
    /// interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.cancelled() => false,
        }
    }
}
