use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled by shutdown request")]
pub struct Cancelled;

/// Receiving side of the process shutdown flag; every intentional wait races it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that is never triggered, for tests and one-off tools.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.sleep_until(Instant::now() + duration).await
    }

    pub async fn sleep_until(&self, deadline: Instant) -> Result<(), Cancelled> {
        if self.is_triggered() {
            return Err(Cancelled);
        }
        if deadline <= Instant::now() {
            return Ok(());
        }

        let mut rx = self.rx.clone();
        tokio::select! {
            _ = sleep_until(deadline) => Ok(()),
            // A dropped sender disables this branch instead of cancelling.
            Ok(_) = rx.wait_for(|stop| *stop) => Err(Cancelled),
        }
    }
}
