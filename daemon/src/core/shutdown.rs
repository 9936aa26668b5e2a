use tokio::sync::watch;

// Cooperative cancellation token shared by every long-lived task.
// The handle flips the flag once; signals are cheap to clone and await.
#[derive(Debug)]
pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownHandle { sender }, ShutdownSignal { receiver })
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // Receivers may all be gone already during teardown
        let _ = self.sender.send(true);
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    // Resolves when shutdown is requested. Used inside select! arms.
    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                // Handle dropped: treat as shutdown
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_resolves_after_shutdown() {
        let (handle, mut signal) = channel();
        assert!(!signal.is_shutdown());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.shutdown();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("shutdown signal should fire");
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_dropped_handle_counts_as_shutdown() {
        let (handle, mut signal) = channel();
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("dropped handle should release waiters");
    }
}
