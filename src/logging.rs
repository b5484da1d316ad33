//! Tracing setup.
//!
//! `RUST_LOG` selects what is logged (default `warn`). The TUI owns the
//! terminal, so in that mode logs go to a file in the cache directory;
//! everything else logs to stderr.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_LOG_LEVEL: &str = "warn";

/// ~/.cache/ndtspeed/ndtspeed.log on Linux
pub fn log_file_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join("ndtspeed").join("ndtspeed.log"))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL))
        .unwrap_or_default()
}

/// Install the global subscriber. Falls back to stderr if the log file
/// cannot be opened.
pub fn init_logging(to_file: bool) {
    if !to_file {
        init_stderr();
        return;
    }

    match open_log_file() {
        Ok((file, path)) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .with_filter(env_filter());
            tracing_subscriber::registry().with(layer).init();
            tracing::debug!(path = %path.display(), "logging to file");
        }
        Err(e) => {
            init_stderr();
            tracing::warn!("cannot open log file ({}); logging to stderr", e);
        }
    }
}

fn init_stderr() {
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter());
    tracing_subscriber::registry().with(layer).init();
}

fn open_log_file() -> std::io::Result<(File, PathBuf)> {
    let path = log_file_path()
        .ok_or_else(|| std::io::Error::other("no cache directory"))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::options().create(true).append(true).open(&path)?;
    Ok((file, path))
}
