//! Cancellation signal shared between control loops and the network layer.
//!
//! A thin wrapper over a `tokio::sync::watch` channel holding a single
//! `bool`. The trigger side is cheap to clone and can be fired any number
//! of times; every signal observes the first `true`. Dropping every trigger
//! also counts as cancellation so an orphaned loop never spins forever.

use std::sync::Arc;

use tokio::sync::watch;

/// Fires the cancellation.
#[derive(Debug, Clone)]
pub struct CancelTrigger {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes the cancellation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair.
pub fn cancel_pair() -> (CancelTrigger, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelTrigger { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelTrigger {
    /// Set the signal. Idempotent.
    pub fn cancel(&self) {
        // send_replace stores the value even when no receiver is alive.
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new signal observing this trigger.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// Non-blocking check, used at loop iteration boundaries.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the signal is set (or every trigger is gone).
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}
