use serde::Deserialize;

use crate::error::SpeedError;
use crate::state::ServerCandidate;

use super::retry::{Backoff, Exhausted, retry_with_backoff};
use super::transport::{HttpReply, LocateTransport};

/// M-Lab locate v2 endpoint for the nearest ndt7 servers
pub const DEFAULT_LOCATE_URL: &str = "https://locate.measurementlab.net/v2/nearest/ndt/ndt7";

/// Longest body excerpt kept in an error detail
const MAX_DETAIL_CHARS: usize = 200;

/// Outcome of one resolution
#[derive(Debug)]
pub enum LocateResult {
    /// Manual hostname, no lookup performed
    Override(String),
    /// Candidates from discovery, best first
    Resolved(Vec<ServerCandidate>),
    /// Every attempt failed
    Failed(SpeedError),
}

/// Whether `host` is usable as a manual override (`[A-Za-z0-9.-]+`)
pub fn is_valid_override(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Resolves a measurement server through an override or the discovery service
pub struct LocateResolver<T> {
    transport: T,
    url: String,
    backoff: Backoff,
}

impl<T: LocateTransport> LocateResolver<T> {
    pub fn new(transport: T, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve a server. Never fails outright: errors come back as
    /// [`LocateResult::Failed`].
    pub async fn resolve(&self, manual_override: Option<&str>, max_attempts: u32) -> LocateResult {
        if let Some(host) = manual_override {
            if is_valid_override(host) {
                tracing::info!(server = host, "using manual server override");
                return LocateResult::Override(host.to_string());
            }
            tracing::warn!(server = host, "ignoring malformed server override");
        }

        match retry_with_backoff(max_attempts, &self.backoff, |attempt| self.attempt(attempt)).await
        {
            Ok(candidates) => {
                tracing::info!(count = candidates.len(), "discovery returned candidates");
                LocateResult::Resolved(candidates)
            }
            Err(Exhausted { attempts, last }) => {
                tracing::warn!(attempts, error = %last, "server discovery exhausted");
                LocateResult::Failed(SpeedError::ResolutionExhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
        }
    }

    async fn attempt(&self, attempt: u32) -> Result<Vec<ServerCandidate>, SpeedError> {
        tracing::debug!(attempt, url = %self.url, "discovery attempt");
        let reply = self.transport.fetch(&self.url).await?;
        parse_results(&reply)
    }
}

/// Extract the `results` array from a discovery reply
pub fn parse_results(reply: &HttpReply) -> Result<Vec<ServerCandidate>, SpeedError> {
    let malformed = |detail: String| SpeedError::MalformedResponse {
        status: reply.status,
        detail: truncate_detail(&detail),
    };

    let value: serde_json::Value = serde_json::from_str(&reply.body)
        .map_err(|e| malformed(format!("invalid JSON ({}): {}", e, reply.body)))?;

    let Some(results) = value.get("results").and_then(|r| r.as_array()) else {
        return Err(malformed(value.to_string()));
    };

    // An odd entry is dropped, not the whole reply; an empty list is the
    // session's problem
    Ok(results
        .iter()
        .enumerate()
        .filter_map(|(i, r)| match ServerCandidate::deserialize(r) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                tracing::debug!(index = i, error = %e, "skipping unusable server entry");
                None
            }
        })
        .collect())
}

fn truncate_detail(s: &str) -> String {
    if s.chars().count() <= MAX_DETAIL_CHARS {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(MAX_DETAIL_CHARS - 1).collect();
        format!("{}\u{2026}", truncated)
    }
}
