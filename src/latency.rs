//! Best-effort latency estimate.
//!
//! A handful of sequential round trips to a cheap endpoint, averaged. This
//! is a diagnostic only: the MinRTT the server reports during the download
//! phase is more accurate and always wins over the probe value.

use reqwest::header::CACHE_CONTROL;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Result, SpeedError};
use crate::locate::transport::user_agent;

/// Endpoint that answers 204 with an empty body and no caching
pub const DEFAULT_LATENCY_URL: &str = "https://www.gstatic.com/generate_204";

/// One timed round trip
pub trait RoundTrip: Send + Sync {
    fn round_trip(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Uncredentialed HTTP GET round trip (no cookie store, `no-store` caching)
#[derive(Debug, Clone)]
pub struct HttpRoundTrip {
    client: reqwest::Client,
    url: String,
}

impl HttpRoundTrip {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(|e| SpeedError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl RoundTrip for HttpRoundTrip {
    async fn round_trip(&self) -> Result<()> {
        // Status is irrelevant, only delivery time counts
        let response = self
            .client
            .get(&self.url)
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;
        response.bytes().await?;
        Ok(())
    }
}

/// Averages sequential round trips
pub struct LatencyProber<R> {
    round_trip: R,
}

impl<R: RoundTrip> LatencyProber<R> {
    pub fn new(round_trip: R) -> Self {
        Self { round_trip }
    }

    /// Mean round-trip time in whole milliseconds over `iterations` probes.
    ///
    /// Returns `None` if any probe fails; there is no partial average.
    pub async fn probe(&self, iterations: u32) -> Option<u64> {
        let iterations = iterations.max(1);
        let mut total = Duration::ZERO;

        for i in 0..iterations {
            let started = Instant::now();
            if let Err(e) = self.round_trip.round_trip().await {
                tracing::debug!(probe = i + 1, error = %e, "latency probe failed");
                return None;
            }
            total += started.elapsed();
        }

        let mean_ms = total.as_nanos() as f64 / iterations as f64 / 1_000_000.0;
        tracing::debug!(iterations, mean_ms, "latency probe finished");
        Some(mean_ms.round() as u64)
    }
}

/// Convert a server-reported MinRTT in microseconds to whole milliseconds
pub fn min_rtt_to_ms(min_rtt_us: f64) -> u64 {
    if !min_rtt_us.is_finite() {
        return 0;
    }
    (min_rtt_us / 1000.0).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Sleeps for each scripted delay; `None` simulates a transport fault
    struct ScriptedRoundTrip {
        delays: Mutex<VecDeque<Option<Duration>>>,
    }

    impl ScriptedRoundTrip {
        fn new(delays: Vec<Option<u64>>) -> Self {
            Self {
                delays: Mutex::new(
                    delays
                        .into_iter()
                        .map(|d| d.map(Duration::from_millis))
                        .collect(),
                ),
            }
        }
    }

    impl RoundTrip for ScriptedRoundTrip {
        async fn round_trip(&self) -> Result<()> {
            let next = self.delays.lock().pop_front().flatten();
            match next {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                None => Err(SpeedError::Transport("connection refused".into())),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mean_is_rounded() {
        let prober = LatencyProber::new(ScriptedRoundTrip::new(vec![
            Some(40),
            Some(44),
            Some(41),
            Some(43),
            Some(42),
        ]));
        assert_eq!(prober.probe(5).await, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rounds_half_up() {
        let prober = LatencyProber::new(ScriptedRoundTrip::new(vec![Some(10), Some(11)]));
        assert_eq!(prober.probe(2).await, Some(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_failure_abandons_probe() {
        let prober =
            LatencyProber::new(ScriptedRoundTrip::new(vec![Some(20), Some(20), None, Some(20)]));
        assert_eq!(prober.probe(4).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_iterations_runs_once() {
        let prober = LatencyProber::new(ScriptedRoundTrip::new(vec![Some(7)]));
        assert_eq!(prober.probe(0).await, Some(7));
    }

    #[test]
    fn test_min_rtt_conversion() {
        assert_eq!(min_rtt_to_ms(18000.0), 18);
        assert_eq!(min_rtt_to_ms(18499.0), 18);
        assert_eq!(min_rtt_to_ms(18500.0), 19);
        assert_eq!(min_rtt_to_ms(0.0), 0);
        assert_eq!(min_rtt_to_ms(-250.0), 0);
        assert_eq!(min_rtt_to_ms(f64::NAN), 0);
    }
}
