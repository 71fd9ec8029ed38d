//! Bounded retry with exponential backoff for adapter calls.
//!
//! Retryable failures (timeouts, transport errors) are retried locally
//! on a fixed schedule; rejections are surfaced immediately. After
//! exhaustion the caller decides whether the symbol enters reconciliation.

use crate::error::{AdapterError, AdapterResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff schedule between attempts.
pub const BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_millis(200),
    Duration::from_millis(800),
    Duration::from_millis(2000),
];

/// Run `op` up to `1 + BACKOFF_SCHEDULE.len()` times, sleeping per the
/// schedule between retryable failures.
pub async fn retry_with_backoff<T, F, Fut>(label: &str, mut op: F) -> AdapterResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AdapterResult<T>>,
{
    let mut last_err = AdapterError::Timeout;

    for (attempt, delay) in std::iter::once(None)
        .chain(BACKOFF_SCHEDULE.iter().map(Some))
        .enumerate()
    {
        if let Some(delay) = delay {
            tokio::time::sleep(*delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!(label, attempt, error = %e, "Adapter call failed, will retry");
                last_err = e;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_backoff("test", move || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AdapterError::Transport("flaky".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: AdapterResult<()> = retry_with_backoff("test", move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AdapterError::Rejected("bad size".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(AdapterError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let result: AdapterResult<()> = retry_with_backoff("test", || async {
            Err(AdapterError::Timeout)
        })
        .await;

        assert!(matches!(result, Err(AdapterError::Timeout)));
    }
}
