//! Terminal speed test against the M-Lab ndt7 platform.
//!
//! Discovery with bounded retries, a best-effort latency probe, the
//! measurement session state machine, and the run history. The throughput
//! test itself is delegated to a [`engine::MeasurementEngine`].

pub mod cli;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod export;
pub mod latency;
pub mod locate;
pub mod logging;
pub mod prefs;
pub mod proxy;
pub mod state;
pub mod tui;

pub use error::{Result, SpeedError};
