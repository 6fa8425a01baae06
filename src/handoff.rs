//! One-shot hand-off between a remote call and the write that depends on it
//!
//! The producer runs as its own task and publishes exactly one `Result` on a
//! oneshot channel. The consumer waits for it with a deadline, so a hung
//! remote call surfaces as [`HubError::Timeout`] instead of parking the flow
//! forever, and a producer that dies without sending surfaces as
//! [`HubError::HandOff`].

use crate::{HubError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

/// Run `producer` in a separate task and wait up to `timeout` for its value
///
/// On timeout the producer task is aborted.
pub async fn hand_off<T, F>(operation: &str, timeout: Duration, producer: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let result = producer.await;
        // Receiver is gone when the consumer already timed out
        let _ = tx.send(result);
    });

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(HubError::HandOff(format!(
            "{} producer exited without a result",
            operation
        ))),
        Err(_) => {
            task.abort();
            tracing::warn!(operation = operation, timeout_secs = timeout.as_secs_f64(), "Hand-off timed out");
            Err(HubError::Timeout {
                operation: operation.to_string(),
                after: timeout,
            })
        }
    }
}
