// src/exec/signal.rs

//! One-shot stop notification shared between a running command and whoever
//! wants to stop it.

use std::sync::Arc;

use tokio::sync::watch;

/// A stop signal that can be fired any number of times from any task.
///
/// Firing is sticky: once fired, every current and future waiter sees it.
/// Firing twice is a no-op.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns `true` if this call was the one that fired it.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has been fired.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn firing_twice_is_harmless() {
        let stop = StopSignal::new();
        assert!(!stop.is_fired());
        assert!(stop.fire());
        assert!(!stop.fire());
        assert!(stop.is_fired());
    }

    #[tokio::test]
    async fn waiters_wake_on_fire_and_late_waiters_return_at_once() {
        let stop = StopSignal::new();
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.fired().await })
        };

        tokio::task::yield_now().await;
        stop.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        tokio::time::timeout(Duration::from_millis(100), stop.fired())
            .await
            .unwrap();
    }
}
