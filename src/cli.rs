use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Terminal internet speed test against the M-Lab ndt7 platform
#[derive(Parser, Debug, Clone)]
#[command(name = "ndtspeed")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Measurement server hostname (skips discovery)
    #[arg(short = 's', long = "server")]
    pub server: Option<String>,

    /// Discovery attempts before giving up
    #[arg(long = "attempts", default_value = "5")]
    pub attempts: u32,

    /// Seconds without any measurement before a run is failed
    #[arg(long = "safety-timeout", default_value = "45")]
    pub safety_timeout: f64,

    /// Round trips averaged by the latency probe
    #[arg(long = "latency-probes", default_value = "5")]
    pub latency_probes: u32,

    /// Discovery endpoint (e.g. a running --proxy)
    #[arg(long = "locate-url")]
    pub locate_url: Option<String>,

    /// Endpoint used by the latency probe
    #[arg(long = "latency-url")]
    pub latency_url: Option<String>,

    /// Path to the ndt7-client program
    #[arg(long = "ndt7-client")]
    pub ndt7_client: Option<PathBuf>,

    /// HTTP timeout in seconds for discovery and latency requests
    #[arg(long = "http-timeout", default_value = "10")]
    pub http_timeout: f64,

    /// Disable TUI (single run, streaming output)
    #[arg(long = "no-tui")]
    pub no_tui: bool,

    /// Output JSON (single run, or the history with --history)
    #[arg(long = "json")]
    pub json: bool,

    /// Output CSV (requires --history)
    #[arg(long = "csv")]
    pub csv: bool,

    /// Print saved history and exit
    #[arg(long = "history")]
    pub history: bool,

    /// History file location
    #[arg(long = "history-file")]
    pub history_file: Option<PathBuf>,

    /// Don't write finished runs to the history file
    #[arg(long = "no-save")]
    pub no_save: bool,

    /// Run the discovery proxy on this address (e.g. 127.0.0.1:3000)
    #[arg(long = "proxy", value_name = "ADDR")]
    pub proxy: Option<SocketAddr>,

    /// Color theme (default, dracula, nord, gruvbox, solarized, monochrome)
    #[arg(long = "theme", default_value = "default")]
    pub theme: String,
}

impl Args {
    pub fn safety_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.safety_timeout)
    }

    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.http_timeout)
    }

    /// Non-interactive single run
    pub fn is_single_run(&self) -> bool {
        !self.history && self.proxy.is_none() && (self.json || self.no_tui)
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.attempts == 0 {
            return Err("Attempts must be at least 1".into());
        }

        const MAX_ATTEMPTS: u32 = 20;
        if self.attempts > MAX_ATTEMPTS {
            return Err(format!("Attempts cannot exceed {}", MAX_ATTEMPTS));
        }

        if !self.safety_timeout.is_finite() || self.safety_timeout <= 0.0 {
            return Err("Safety timeout must be positive".into());
        }

        if !self.http_timeout.is_finite() || self.http_timeout <= 0.0 {
            return Err("HTTP timeout must be positive".into());
        }

        if self.latency_probes == 0 {
            return Err("Latency probes must be at least 1".into());
        }

        if self.csv && !self.history {
            return Err("--csv requires --history".into());
        }

        if self.csv && self.json {
            return Err("Cannot specify both --csv and --json".into());
        }

        if self.proxy.is_some() && (self.history || self.json || self.csv || self.no_tui) {
            return Err("--proxy cannot be combined with output modes".into());
        }

        Ok(())
    }
}
