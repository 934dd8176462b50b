//! Deadline race for store calls.
//!
//! The operation and a timer are polled together; whichever finishes first
//! decides the outcome. When the timer wins the operation future is dropped,
//! which cancels it for drivers whose futures own the request (the in-memory
//! collection and most async drivers). A driver that hands work to a
//! detached task keeps running it to completion in the background and its
//! result is discarded; such drivers must bound that work themselves.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::StoreError;

/// Run `operation`, failing with [`StoreError::Timeout`] if it is still
/// pending after `deadline`.
pub async fn run_bounded<F, T>(deadline: Duration, context: &str, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        // Prefer a ready result over a simultaneously expired timer.
        biased;
        outcome = operation => outcome,
        _ = tokio::time::sleep(deadline) => {
            warn!(context, deadline_secs = deadline.as_secs_f64(), "store operation timed out");
            Err(StoreError::Timeout {
                context: context.to_string(),
                deadline,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn fast_operation_wins() {
        let out = run_bounded(Duration::from_secs(1), "fast", async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn operation_errors_propagate() {
        let out: Result<(), _> =
            run_bounded(Duration::from_secs(1), "failing", async { Err(StoreError::db("boom")) }).await;
        assert!(matches!(out, Err(StoreError::Db(msg)) if msg == "boom"));
    }

    #[tokio::test]
    async fn slow_operation_times_out_and_is_abandoned() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let out = run_bounded(Duration::from_millis(20), "slow read", async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, StoreError>(())
        })
        .await;

        match out {
            Err(StoreError::Timeout { context, deadline }) => {
                assert_eq!(context, "slow read");
                assert_eq!(deadline, Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst), "abandoned operation kept running");
    }
}
