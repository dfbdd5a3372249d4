//! Failure policy shared by both ends of a relay session
//!
//! A connection that reports `failed` is closed; nothing is retried.

use framerelay_core::{ConnectionState, RelayResult};
use std::future::Future;
use tokio::sync::watch;

/// Wait until `states` reaches a terminal state and run `close` if it failed
///
/// Returns the terminal state. A dropped state sender counts as closed.
pub async fn close_on_failure<F, Fut>(
    mut states: watch::Receiver<ConnectionState>,
    close: F,
) -> ConnectionState
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RelayResult<()>>,
{
    let terminal = match states.wait_for(|s| s.is_terminal()).await {
        Ok(state) => *state,
        Err(_) => ConnectionState::Closed,
    };
    drop(states);

    if terminal == ConnectionState::Failed {
        tracing::warn!("Connection failed, closing");
        if let Err(e) = close().await {
            tracing::warn!("Close after failure: {}", e);
        }
    }
    terminal
}

#[cfg(test)]
mod tests {
    use super::*;
    use framerelay_core::RelayError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_close(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::future::Ready<RelayResult<()>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_state_triggers_close() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let calls = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(close_on_failure(rx, counting_close(&calls)));

        tx.send(ConnectionState::Connected).unwrap();
        tx.send(ConnectionState::Failed).unwrap();

        assert_eq!(task.await.unwrap(), ConnectionState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_state_does_not_close_again() {
        let (tx, rx) = watch::channel(ConnectionState::Connected);
        let calls = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(close_on_failure(rx, counting_close(&calls)));

        tx.send(ConnectionState::Closed).unwrap();

        assert_eq!(task.await.unwrap(), ConnectionState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_closed() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        drop(tx);
        let calls = Arc::new(AtomicUsize::new(0));
        let state = close_on_failure(rx, counting_close(&calls)).await;
        assert_eq!(state, ConnectionState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_error_is_not_fatal() {
        let (_tx, rx) = watch::channel(ConnectionState::Failed);
        let state = close_on_failure(rx, || async {
            Err(RelayError::Signaling {
                reason: "already gone".to_string(),
            })
        })
        .await;
        assert_eq!(state, ConnectionState::Failed);
    }
}
