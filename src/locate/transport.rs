use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SpeedError};

/// Status and raw body of an HTTP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// One GET against the discovery service
///
/// A reply with any status is `Ok`; only failing to get a reply at all is
/// an error. Judging the body is the resolver's job.
pub trait LocateTransport: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<HttpReply>> + Send;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(|e| SpeedError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl LocateTransport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<HttpReply> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

/// User-Agent sent with every outbound request
pub fn user_agent() -> String {
    format!("ndtspeed/{}", env!("CARGO_PKG_VERSION"))
}
