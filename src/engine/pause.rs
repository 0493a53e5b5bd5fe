use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::info;

/// Cooperative pause switch shared by the engine's workers.
///
/// Progress and outcome updates go through [`PauseGate::publish`]. Once
/// `pause` has returned no further update is published until `resume`.
#[derive(Debug)]
pub struct PauseGate {
    tx: watch::Sender<bool>,
    publishing: RwLock<()>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx,
            publishing: RwLock::new(()),
        }
    }

    pub fn pause(&self) {
        // waits out any update that is being published right now
        let _publishers = self.publishing.write();
        if !self.tx.send_replace(true) {
            info!("Engine paused");
        }
    }

    pub fn resume(&self) {
        if self.tx.send_replace(false) {
            info!("Engine resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns immediately unless paused, otherwise waits for `resume`
    pub async fn wait_until_resumed(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so this cannot see a closed channel
        let _ = rx.wait_for(|paused| !*paused).await;
    }

    /// Run `update` while not paused, waiting for `resume` first if needed
    pub async fn publish<R, F: FnOnce() -> R>(&self, update: F) -> R {
        let mut update = update;
        loop {
            self.wait_until_resumed().await;
            match self.try_publish(update) {
                Ok(result) => return result,
                Err(pending) => update = pending,
            }
        }
    }

    fn try_publish<R, F: FnOnce() -> R>(&self, update: F) -> Result<R, F> {
        let _guard = self.publishing.read();
        if self.is_paused() {
            Err(update)
        } else {
            Ok(update())
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_blocks_until_resume() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_until_resumed().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nothing_published_after_pause_returns() {
        let gate = Arc::new(PauseGate::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    for _ in 0..2_000 {
                        gate.publish(|| counter.fetch_add(1, Ordering::SeqCst)).await;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(5)).await;
        gate.pause();
        let frozen = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), frozen);

        gate.resume();
        for publisher in publishers {
            publisher.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8_000);
    }
}
