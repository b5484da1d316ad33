use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by discovery, the engine, and the history store.
///
/// `Transport` and `MalformedResponse` only ever describe a single discovery
/// attempt; the resolver folds them into `ResolutionExhausted` once every
/// attempt has been spent.
#[derive(Debug, Error)]
pub enum SpeedError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response (HTTP {status}): {detail}")]
    MalformedResponse { status: u16, detail: String },

    #[error("no server after {attempts} attempt(s), last error: {last}")]
    ResolutionExhausted { attempts: u32, last: Box<SpeedError> },

    #[error("{0}")]
    EngineFault(String),

    #[error("timed out after {}s without measurement data", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SpeedError {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::EngineFault(msg.into())
    }
}

impl From<reqwest::Error> for SpeedError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SpeedError>;
