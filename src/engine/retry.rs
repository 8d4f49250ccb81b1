// src/engine/retry.rs

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Run `op`, waiting `backoff[i]` after the i-th failure and trying again.
///
/// The attempt after the last wait is final: its error is returned.
pub async fn retry<T, E, F>(label: &str, backoff: &[Duration], mut op: F) -> Result<T, E>
where
    F: AsyncFnMut() -> Result<T, E>,
    E: fmt::Display,
{
    for (attempt, wait) in backoff.iter().enumerate() {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(
                    op = label,
                    attempt = attempt + 1,
                    retry_in = ?wait,
                    error = %err,
                    "operation failed; retrying"
                );
                sleep(*wait).await;
            }
        }
    }

    op().await.inspect_err(|err| {
        warn!(op = label, error = %err, "operation failed; giving up");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let backoff = [Duration::from_millis(1); 3];

        let value = retry("flaky", &backoff, async || {
            calls += 1;
            if calls < 3 { Err("not yet") } else { Ok(calls) }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn last_attempt_error_propagates() {
        let mut calls = 0;
        let backoff = [Duration::from_millis(1), Duration::from_millis(1)];

        let err = retry("broken", &backoff, async || -> Result<(), String> {
            calls += 1;
            Err(format!("failure {calls}"))
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 3);
        assert_eq!(err, "failure 3");
    }

    #[tokio::test]
    async fn empty_backoff_tries_once() {
        let mut calls = 0;
        let res: Result<(), &str> = retry("once", &[], async || {
            calls += 1;
            Err("nope")
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls, 1);
    }
}
