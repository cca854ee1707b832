//! Retry policy shared by the fetch client, pagination and extraction
//!
//! A policy only decides how many attempts are made and how long to wait
//! between them. Which outcomes are worth another attempt is up to the caller.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Delay applied before each retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Same delay before every retry
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (0 is treated as 1)
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(3)
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::None,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, max },
        }
    }

    /// Effective attempt ceiling
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }

    /// Sleeps for the delay that follows `attempt`
    pub async fn wait_after(&self, attempt: u32) {
        let delay = self.delay_after(attempt);
        if !delay.is_zero() {
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after delay"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Runs `operation` until `should_retry` rejects its outcome or attempts run out
    ///
    /// The operation receives the 1-based attempt number. Errors are returned
    /// immediately; only successful outcomes are inspected. When attempts are
    /// exhausted the last outcome is returned as is.
    pub async fn run<T, E, F, Fut, P>(&self, mut operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&T) -> bool,
    {
        let attempts = self.attempts();
        let mut attempt = 1;

        loop {
            let outcome = operation(attempt).await?;
            if attempt >= attempts || !should_retry(&outcome) {
                return Ok(outcome);
            }

            self.wait_after(attempt).await;
            attempt += 1;
        }
    }
}

/// Every 5xx status is transient for engine level policies
pub fn is_server_error(status: u16) -> bool {
    (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delays() {
        assert_eq!(RetryPolicy::immediate(3).delay_after(2), Duration::ZERO);
        assert_eq!(
            RetryPolicy::fixed(3, Duration::from_millis(250)).delay_after(7),
            Duration::from_millis(250)
        );

        let policy =
            RetryPolicy::exponential(10, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retries_until_attempts_exhausted() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome: Result<u16, ()> = RetryPolicy::immediate(3)
            .run(
                move |_| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(503)
                },
                |status| *status > 500,
            )
            .await;

        assert_eq!(outcome, Ok(503));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_on_accepted_outcome() {
        let outcome: Result<u16, ()> = RetryPolicy::immediate(5)
            .run(
                |attempt| async move { Ok(if attempt < 2 { 502 } else { 200 }) },
                |status| *status > 500,
            )
            .await;
        assert_eq!(outcome, Ok(200));
    }

    #[tokio::test]
    async fn test_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome: Result<u16, &str> = RetryPolicy::immediate(5)
            .run(
                move |_| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("connection refused")
                },
                |_| true,
            )
            .await;

        assert_eq!(outcome, Err("connection refused"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let outcome: Result<u32, ()> = RetryPolicy::immediate(0)
            .run(|attempt| async move { Ok(attempt) }, |_| true)
            .await;
        assert_eq!(outcome, Ok(1));
    }

    #[test]
    fn test_server_error_range() {
        assert!(is_server_error(500));
        assert!(is_server_error(503));
        assert!(!is_server_error(404));
        assert!(!is_server_error(600));
    }
}
