//! Cooperative cancellation over a `watch` channel.
//!
//! Any `watch::Receiver<bool>` (such as an application shutdown signal)
//! converts into a [`CancelSignal`]; `true` means cancel.

use tokio::sync::watch;

/// Sending half. Dropping it without cancelling leaves the signal pending
/// forever.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(tx), CancelSignal(rx))
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the sender
    /// goes away first.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl From<watch::Receiver<bool>> for CancelSignal {
    fn from(rx: watch::Receiver<bool>) -> Self {
        CancelSignal(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (handle, mut signal) = CancelSignal::pair();
        assert!(!signal.is_cancelled());
        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
            true
        });
        handle.cancel();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_fire() {
        let mut signal = CancelSignal::never();
        let fired = tokio::time::timeout(Duration::from_secs(60), signal.cancelled()).await;
        assert!(fired.is_err());
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_from_shutdown_receiver() {
        let (tx, rx) = watch::channel(false);
        let signal = CancelSignal::from(rx);
        tx.send(true).unwrap();
        assert!(signal.is_cancelled());
    }
}
