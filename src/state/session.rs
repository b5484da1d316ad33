use tokio::time::Instant;

use super::history::HistoryEntry;
use super::server::ServerCandidate;

/// Label before any server is known
pub const LABEL_UNKNOWN: &str = "Server: \u{2014}";
/// Label while the engine looks for a server
pub const LABEL_DISCOVERY: &str = "Finding best server\u{2026}";
/// Transient label right after a user stop
pub const LABEL_STOPPING: &str = "Stopping\u{2026}";
/// Terminal label after a user stop
pub const LABEL_STOPPED: &str = "Stopped";

/// Test direction of a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

/// Where a session is in its lifecycle
///
/// `Completed`, `Failed` and `Stopping` are transitions that land back on
/// `Idle` immediately; how the last run ended is kept in [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Resolving,
    Running(Direction),
}

impl SessionPhase {
    /// Resolving or running
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "locating",
            Self::Running(Direction::Download) => "download",
            Self::Running(Direction::Upload) => "upload",
        }
    }
}

/// How the most recent session ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(HistoryEntry),
    Failed(String),
    Stopped,
}

/// Which source produced the current latency value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencySource {
    /// Mean of the HTTP round-trip probes
    Probe,
    /// MinRTT reported in-band by the server; never overwritten by a probe
    Server,
}

/// The one live session
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Incremented on every start; events tagged with an older value are stale
    pub generation: u64,
    pub phase: SessionPhase,
    /// Set by a user stop; suppresses every later callback of this session
    pub ignore_updates: bool,
    pub gauge_mbps: f64,
    pub last_download_mbps: f64,
    pub last_upload_mbps: f64,
    pub latency_ms: Option<u64>,
    pub latency_source: Option<LatencySource>,
    pub server_label: String,
    pub chosen_server: Option<ServerCandidate>,
    /// Armed safety timer
    pub safety_deadline: Option<Instant>,
    /// Pending switch from "Stopping…" to "Stopped"
    pub stopped_label_at: Option<Instant>,
    pub last_outcome: Option<Outcome>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            generation: 0,
            phase: SessionPhase::Idle,
            ignore_updates: false,
            gauge_mbps: 0.0,
            last_download_mbps: 0.0,
            last_upload_mbps: 0.0,
            latency_ms: None,
            latency_source: None,
            server_label: LABEL_UNKNOWN.to_string(),
            chosen_server: None,
            safety_deadline: None,
            stopped_label_at: None,
            last_outcome: None,
        }
    }
}

impl SessionState {
    pub fn running(&self) -> bool {
        self.phase.is_active()
    }

    /// Clear observable fields for a fresh run (generation is kept)
    pub fn reset_observables(&mut self) {
        self.gauge_mbps = 0.0;
        self.last_download_mbps = 0.0;
        self.last_upload_mbps = 0.0;
        self.latency_ms = None;
        self.latency_source = None;
        self.server_label = LABEL_UNKNOWN.to_string();
        self.chosen_server = None;
        self.stopped_label_at = None;
        self.last_outcome = None;
    }

    /// Neither direction has produced a non-zero sample yet
    pub fn has_no_samples(&self) -> bool {
        self.last_download_mbps == 0.0 && self.last_upload_mbps == 0.0
    }
}

/// Observable fields published to renderers
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub generation: u64,
    pub phase: SessionPhase,
    pub running: bool,
    pub gauge_mbps: f64,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: Option<u64>,
    pub server_label: String,
    pub last_outcome: Option<Outcome>,
    pub history: Vec<HistoryEntry>,
}

impl Snapshot {
    pub fn capture(state: &SessionState, history: &[HistoryEntry]) -> Self {
        Self {
            generation: state.generation,
            phase: state.phase,
            running: state.running(),
            gauge_mbps: state.gauge_mbps,
            download_mbps: state.last_download_mbps,
            upload_mbps: state.last_upload_mbps,
            latency_ms: state.latency_ms,
            server_label: state.server_label.clone(),
            last_outcome: state.last_outcome.clone(),
            history: history.to_vec(),
        }
    }
}
