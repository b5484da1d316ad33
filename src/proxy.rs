//! Discovery proxy.
//!
//! `GET /api/locate` relays the discovery lookup so that many clients share
//! one upstream request. Successful replies are kept for ten minutes and
//! marked cacheable for shared caches in front of the proxy.

use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SpeedError};
use crate::locate::{HttpReply, LocateTransport};

/// Shared-cache lifetime of a successful upstream reply
pub const CACHE_TTL: Duration = Duration::from_secs(600);

/// Cache policy advertised on every relayed reply
pub const CACHE_CONTROL_VALUE: &str = "public, s-maxage=600, max-age=0";

struct CachedReply {
    reply: HttpReply,
    expires: Instant,
}

pub struct ProxyState<T> {
    transport: T,
    upstream: String,
    ttl: Duration,
    cache: Mutex<Option<CachedReply>>,
    /// Held while refilling so a burst of misses makes one upstream call
    refill: tokio::sync::Mutex<()>,
}

impl<T: LocateTransport> ProxyState<T> {
    pub fn new(transport: T, upstream: impl Into<String>) -> Self {
        Self {
            transport,
            upstream: upstream.into(),
            ttl: CACHE_TTL,
            cache: Mutex::new(None),
            refill: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    fn cached(&self, now: Instant) -> Option<HttpReply> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|c| c.expires > now)
            .map(|c| c.reply.clone())
    }

    /// Reply for one client, from the cache when fresh
    pub async fn lookup(&self) -> Result<HttpReply> {
        if let Some(reply) = self.cached(Instant::now()) {
            tracing::debug!("locate served from cache");
            return Ok(reply);
        }

        let _refill = self.refill.lock().await;
        if let Some(reply) = self.cached(Instant::now()) {
            tracing::debug!("locate served from cache refilled meanwhile");
            return Ok(reply);
        }

        let reply = self.transport.fetch(&self.upstream).await?;
        tracing::info!(status = reply.status, "locate relayed from upstream");
        if (200..300).contains(&reply.status) {
            *self.cache.lock() = Some(CachedReply {
                reply: reply.clone(),
                expires: Instant::now() + self.ttl,
            });
        }
        Ok(reply)
    }
}

pub fn router<T: LocateTransport + 'static>(state: Arc<ProxyState<T>>) -> Router {
    Router::new()
        .route("/api/locate", get(locate::<T>))
        .with_state(state)
}

async fn locate<T: LocateTransport + 'static>(State(state): State<Arc<ProxyState<T>>>) -> Response {
    match state.lookup().await.and_then(relay) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "locate relay failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn relay(reply: HttpReply) -> Result<Response> {
    let status = StatusCode::from_u16(reply.status).map_err(|_| {
        SpeedError::Transport(format!("upstream sent invalid status {}", reply.status))
    })?;
    let mut response = (status, reply.body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));
    Ok(response)
}

/// Serve the proxy on `addr` until `cancel` fires
pub async fn serve<T: LocateTransport + 'static>(
    addr: SocketAddr,
    state: Arc<ProxyState<T>>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "discovery proxy listening on http://{}/api/locate",
        listener.local_addr()?
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTransport {
        status: u16,
        latency: Duration,
        calls: AtomicU32,
    }

    impl CountingTransport {
        fn new(status: u16) -> Self {
            Self {
                status,
                latency: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }

        fn slow(status: u16, latency: Duration) -> Self {
            Self {
                latency,
                ..Self::new(status)
            }
        }
    }

    impl LocateTransport for CountingTransport {
        async fn fetch(&self, _url: &str) -> Result<HttpReply> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.latency).await;
            Ok(HttpReply {
                status: self.status,
                body: format!("{{\"results\":[],\"n\":{}}}", n),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_cached_until_ttl() {
        let state = ProxyState::new(CountingTransport::new(200), "http://upstream");

        let first = state.lookup().await.unwrap();
        let second = state.lookup().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(state.transport.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(CACHE_TTL).await;
        let third = state.lookup().await.unwrap();
        assert_ne!(third, first);
        assert_eq!(state.transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_misses_makes_one_upstream_call() {
        let state = ProxyState::new(
            CountingTransport::slow(200, Duration::from_millis(300)),
            "http://upstream",
        );

        let replies = futures::future::join_all((0..8).map(|_| state.lookup())).await;
        let first = replies[0].as_ref().unwrap();
        assert!(replies.iter().all(|r| r.as_ref().unwrap() == first));
        assert_eq!(state.transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_failures_is_not_shared() {
        let state = ProxyState::new(
            CountingTransport::slow(503, Duration::from_millis(300)),
            "http://upstream",
        );
        futures::future::join_all((0..3).map(|_| state.lookup())).await;
        assert_eq!(state.transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_not_cached() {
        let state = ProxyState::new(CountingTransport::new(429), "http://upstream");
        state.lookup().await.unwrap();
        state.lookup().await.unwrap();
        assert_eq!(state.transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_relay_sets_headers() {
        let response = relay(HttpReply {
            status: 503,
            body: "{}".into(),
        })
        .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[CACHE_CONTROL], CACHE_CONTROL_VALUE);
    }

    #[test]
    fn test_relay_rejects_bad_status() {
        assert!(
            relay(HttpReply {
                status: 42,
                body: String::new(),
            })
            .is_err()
        );
    }
}
