// Batch Cancellation Token

use tokio::sync::watch;

/// Cancellation signal shared by every job of one batch
#[derive(Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// Token that is never cancelled (standalone sandbox calls, tests)
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Wait for cancellation
    ///
    /// Resolves immediately if already cancelled. Pends forever if the
    /// sender is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                if closed {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Cancel sender, owned by the orchestrator of a batch
pub struct CancelSender {
    tx: watch::Sender<bool>,
}

impl CancelSender {
    /// Cancel every job still holding a token
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a cancel channel
pub fn cancel_channel() -> (CancelSender, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSender { tx }, CancelToken { rx: Some(rx) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_all_clones() {
        let (tx, token) = cancel_channel();
        let mut a = token.clone();
        let mut b = token.clone();

        let waiter = tokio::spawn(async move {
            a.cancelled().await;
            b.cancelled().await;
        });

        tx.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiters should wake")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let (tx, mut token) = cancel_channel();
        tx.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("should resolve without a new change");
    }

    #[tokio::test]
    async fn test_dropped_sender_never_cancels() {
        let (tx, mut token) = cancel_channel();
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }
}
