//! Bounded retry with linear backoff and jitter.
//!
//! The combinator knows nothing about HTTP: it runs an attempt closure up to
//! `max_attempts` times on top of `tokio_retry`, sleeping between failures,
//! and reports the last error once the attempts are spent.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_retry::Retry;

/// Delay schedule between attempts: `min(cap, attempt * step) + uniform(0..jitter)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub step: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(2000),
            cap: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
        }
    }
}

impl Backoff {
    /// Delay without jitter after the given 1-based attempt
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.cap)
    }

    /// Delay after the given 1-based attempt, jitter included
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        self.base_delay(attempt) + Duration::from_millis(extra)
    }

    /// Retry strategy for `max_attempts` attempts: one delay between each
    /// pair of attempts, none after the last
    pub fn delays(&self, max_attempts: u32) -> impl Iterator<Item = Duration> + use<> {
        let backoff = *self;
        (1..max_attempts).map(move |attempt| {
            let delay = backoff.delay(attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "backing off"
            );
            delay
        })
    }
}

/// All attempts failed
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `op` until it succeeds or `max_attempts` (at least 1) have failed.
///
/// `op` receives the 1-based attempt number. There is no sleep after the
/// final attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    backoff: &Backoff,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    let result = Retry::spawn(backoff.delays(max_attempts), || {
        attempt += 1;
        let current = attempt;
        let fut = op(current);
        async move {
            let result = fut.await;
            if let Err(ref err) = result {
                tracing::debug!(attempt = current, max_attempts, error = %err, "attempt failed");
            }
            result
        }
    })
    .await;

    result.map_err(|last| Exhausted {
        attempts: attempt,
        last,
    })
}
