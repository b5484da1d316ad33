use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Args;
use crate::controller::ControllerSettings;
use crate::engine::ndt7::DEFAULT_NDT7_CLIENT;
use crate::latency::DEFAULT_LATENCY_URL;
use crate::locate::DEFAULT_LOCATE_URL;
use crate::prefs::Prefs;
use crate::state::History;

/// Runtime configuration: CLI args layered over saved preferences
#[derive(Debug, Clone)]
pub struct Config {
    /// Manual server hostname
    pub server: Option<String>,
    /// Discovery attempts per run
    pub max_attempts: u32,
    /// Fail a run with no measurement after this long
    pub safety_timeout: Duration,
    /// Round trips per latency probe
    pub latency_probes: u32,
    /// Discovery endpoint
    pub locate_url: String,
    /// Latency probe endpoint
    pub latency_url: String,
    /// External measurement program
    pub ndt7_client: PathBuf,
    /// Timeout of each discovery or latency request
    pub http_timeout: Duration,
    /// History file (None = don't persist)
    pub history_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: None,
            max_attempts: 5,
            safety_timeout: Duration::from_secs(45),
            latency_probes: 5,
            locate_url: DEFAULT_LOCATE_URL.to_string(),
            latency_url: DEFAULT_LATENCY_URL.to_string(),
            ndt7_client: PathBuf::from(DEFAULT_NDT7_CLIENT),
            http_timeout: Duration::from_secs(10),
            history_path: History::default_path(),
        }
    }
}

impl Config {
    /// Merge args and prefs: CLI > prefs > defaults
    pub fn new(args: &Args, prefs: &Prefs) -> Self {
        let defaults = Self::default();

        let history_path = if args.no_save {
            None
        } else {
            args.history_file.clone().or(defaults.history_path)
        };

        Self {
            server: args
                .server
                .clone()
                .or_else(|| prefs.server.clone())
                .filter(|s| !s.trim().is_empty()),
            max_attempts: args.attempts,
            safety_timeout: args.safety_timeout_duration(),
            latency_probes: args.latency_probes,
            locate_url: args
                .locate_url
                .clone()
                .or_else(|| prefs.locate_url.clone())
                .unwrap_or(defaults.locate_url),
            latency_url: args.latency_url.clone().unwrap_or(defaults.latency_url),
            ndt7_client: args
                .ndt7_client
                .clone()
                .or_else(|| prefs.ndt7_client.clone())
                .unwrap_or(defaults.ndt7_client),
            http_timeout: args.http_timeout_duration(),
            history_path,
        }
    }

    /// File history is read from (even when saving is disabled)
    pub fn history_source(args: &Args) -> Option<PathBuf> {
        args.history_file.clone().or_else(History::default_path)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            max_attempts: self.max_attempts,
            safety_timeout: self.safety_timeout,
            server_override: self.server.clone(),
            locate_url: Some(self.locate_url.clone()),
            ..Default::default()
        }
    }
}
