//! Cooperative cancellation built on a `watch` channel.

use tokio::sync::watch;

/// Sending half of a shutdown signal.
///
/// Dropping the trigger also counts as a shutdown for every signal
/// derived from it.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Create a trigger together with its first signal.
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    /// Fire the signal. Calling this more than once has no further effect.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Create another signal observing this trigger.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Whether the signal has been fired.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving half of a shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested or the trigger is dropped.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
