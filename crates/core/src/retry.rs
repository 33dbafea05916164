//! Bounded retry with a fixed poll interval.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Returned when every attempt within the timeout failed.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts in {elapsed:?}: {last}")]
pub struct RetryExhausted<E> {
    /// Wall-clock time spent, including sleeps.
    pub elapsed: Duration,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// Error from the final attempt.
    #[source]
    pub last: E,
}

/// Fixed-interval retry bounded by an overall timeout.
///
/// The first attempt runs immediately. After a failure the policy sleeps for
/// `interval` and tries again, unless the next attempt would start after
/// `timeout` has elapsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Establishing a store connection: every 10 seconds for up to a minute.
    pub const CONNECTION: Self = Self::new(Duration::from_secs(10), Duration::from_secs(60));

    /// Metadata reads and writes: every second for up to 10 seconds.
    pub const METADATA_QUERY: Self = Self::new(Duration::from_secs(1), Duration::from_secs(10));

    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Run `operation` until it succeeds or the timeout is exhausted.
    ///
    /// `what` names the operation in retry logs.
    pub async fn run<T, E, F, Fut>(
        &self,
        what: &str,
        mut operation: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if Instant::now() + self.interval > deadline {
                return Err(RetryExhausted {
                    elapsed: start.elapsed(),
                    attempts,
                    last: err,
                });
            }

            tracing::debug!(
                operation = what,
                attempt = attempts,
                retry_in_ms = self.interval.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn succeeds_immediately() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(10));
        let start = Instant::now();
        let value: Result<u32, RetryExhausted<String>> =
            policy.run("noop", || async { Ok::<_, String>(7) }).await;
        assert_eq!(value.unwrap(), 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(10));
        let calls = Cell::new(0u32);
        let start = Instant::now();

        let value = policy
            .run("flaky", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(format!("attempt {n} failed"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_timeout_with_last_error() {
        let policy = RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(60));
        let calls = Cell::new(0u32);

        let err = policy
            .run("always-failing", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err::<(), _>(format!("failure {n}")) }
            })
            .await
            .unwrap_err();

        // Attempts at 0, 10, 20, 30, 40, 50 and 60 seconds.
        assert_eq!(err.attempts, 7);
        assert_eq!(err.last, "failure 7");
        assert_eq!(err.elapsed, Duration::from_secs(60));
        assert!(err.to_string().contains("failure 7"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_tries_once() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::ZERO);
        let calls = Cell::new(0u32);
        let err = policy
            .run("once", || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>("nope") }
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.get(), 1);
    }
}
