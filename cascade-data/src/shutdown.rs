use tokio::sync::watch;

/// Create a linked [`ShutdownTrigger`] & [`Shutdown`] listener pair.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Owner side of the graceful shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cloneable listener for the graceful shutdown signal.
///
/// Dropping the [`ShutdownTrigger`] is treated the same as triggering it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(&mut self) {
        // Err means the trigger was dropped
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
