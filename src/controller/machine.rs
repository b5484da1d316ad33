//! Session state machine.
//!
//! `SessionController` owns the live [`SessionState`] and the history and
//! reacts to commands, engine events, background results and timers. It
//! performs no I/O itself: transitions that need some return an [`Action`]
//! for the driver to carry out. Time is passed in, never read.

use std::time::Duration;
use tokio::time::Instant;

use crate::engine::{EngineConfig, EngineEvent, TaggedEvent};
use crate::error::SpeedError;
use crate::latency::min_rtt_to_ms;
use crate::locate::LocateResult;
use crate::state::session::{LABEL_DISCOVERY, LABEL_STOPPED, LABEL_STOPPING};
use crate::state::{
    Direction, History, HistoryEntry, LatencySource, Outcome, ServerCandidate, SessionPhase,
    SessionState, Snapshot,
};

/// Fixed knobs of the controller
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Discovery attempts per session
    pub max_attempts: u32,
    /// Fail a session that produced no sample within this time
    pub safety_timeout: Duration,
    /// How long "Stopping…" shows before "Stopped"
    pub stop_label_delay: Duration,
    /// Manual server hostname
    pub server_override: Option<String>,
    /// Passed through to the engine
    pub data_policy_accepted: bool,
    /// Passed through to the engine
    pub locate_url: Option<String>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            safety_timeout: Duration::from_secs(45),
            stop_label_delay: Duration::from_millis(800),
            server_override: None,
            data_policy_accepted: true,
            locate_url: None,
        }
    }
}

/// Side effect requested by a transition
#[derive(Debug, Clone)]
pub enum Action {
    /// Run the locate resolver
    Resolve {
        generation: u64,
        server_override: Option<String>,
        max_attempts: u32,
    },
    /// Hand the server to the engine and start the combined test
    StartEngine { generation: u64, config: EngineConfig },
    /// Fire-and-forget latency probe
    ProbeLatency { generation: u64 },
    /// A run finished; write the history out
    Persist(HistoryEntry),
}

pub struct SessionController {
    settings: ControllerSettings,
    state: SessionState,
    history: History,
}

impl SessionController {
    pub fn new(settings: ControllerSettings, history: History) -> Self {
        Self {
            settings,
            state: SessionState::default(),
            history,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.state, self.history.entries())
    }

    /// Earliest pending timer, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.state.safety_deadline, self.state.stopped_label_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Begin a session. A no-op while one is resolving or running.
    pub fn start(&mut self, now: Instant) -> Vec<Action> {
        if self.state.running() {
            tracing::debug!(phase = self.state.phase.label(), "start ignored, session active");
            return Vec::new();
        }

        self.state.generation += 1;
        self.state.reset_observables();
        self.state.ignore_updates = false;
        self.state.phase = SessionPhase::Resolving;
        self.state.safety_deadline = Some(now + self.settings.safety_timeout);
        tracing::info!(generation = self.state.generation, "session started");

        vec![Action::Resolve {
            generation: self.state.generation,
            server_override: self.settings.server_override.clone(),
            max_attempts: self.settings.max_attempts,
        }]
    }

    /// Cancel the active session. Its engine keeps running; everything it
    /// reports from here on is dropped. Returns false when nothing was active.
    pub fn stop(&mut self, now: Instant) -> bool {
        if !self.state.running() {
            return false;
        }

        self.state.ignore_updates = true;
        self.state.phase = SessionPhase::Idle;
        self.state.safety_deadline = None;
        self.state.server_label = LABEL_STOPPING.to_string();
        self.state.stopped_label_at = Some(now + self.settings.stop_label_delay);
        self.state.last_outcome = Some(Outcome::Stopped);
        tracing::info!(generation = self.state.generation, "session stopped by user");
        true
    }

    /// Events from an older session, a stopped one, or a finished one are dropped
    fn accepts(&self, generation: u64) -> bool {
        generation == self.state.generation && !self.state.ignore_updates && self.state.running()
    }

    pub fn on_located(&mut self, generation: u64, result: LocateResult) -> Vec<Action> {
        if !self.accepts(generation) || self.state.phase != SessionPhase::Resolving {
            return Vec::new();
        }

        match result {
            LocateResult::Failed(err) => {
                let message = self.resolution_failure_message(&err);
                self.fail(message);
                Vec::new()
            }
            LocateResult::Override(host) => self.launch(Some(host), Vec::new()),
            LocateResult::Resolved(candidates) if candidates.is_empty() => {
                self.fail(format!(
                    "Error: {}",
                    SpeedError::engine("discovery returned no measurement servers")
                ));
                Vec::new()
            }
            LocateResult::Resolved(candidates) => self.launch(None, candidates),
        }
    }

    fn resolution_failure_message(&self, err: &SpeedError) -> String {
        let mut message = format!("Error: could not locate a measurement server: {}", err);
        if self.settings.server_override.is_none() {
            message.push_str(". Tip: pass --server <hostname> to pick a server manually.");
        }
        message
    }

    fn launch(
        &mut self,
        server_override: Option<String>,
        candidates: Vec<ServerCandidate>,
    ) -> Vec<Action> {
        self.state.phase = SessionPhase::Running(Direction::Download);
        vec![Action::StartEngine {
            generation: self.state.generation,
            config: EngineConfig {
                data_policy_accepted: self.settings.data_policy_accepted,
                server_override,
                candidates,
                locate_url: self.settings.locate_url.clone(),
            },
        }]
    }

    pub fn on_engine_event(&mut self, tagged: TaggedEvent) -> Vec<Action> {
        if !self.accepts(tagged.generation) {
            return Vec::new();
        }

        match tagged.event {
            EngineEvent::ServerDiscovery => {
                self.state.server_label = LABEL_DISCOVERY.to_string();
            }
            EngineEvent::ServerChosen(server) => {
                self.state.server_label = server.label();
                tracing::info!(label = %self.state.server_label, "server chosen");
                self.state.chosen_server = Some(server);
                return vec![Action::ProbeLatency {
                    generation: tagged.generation,
                }];
            }
            EngineEvent::DownloadStart => {
                self.state.phase = SessionPhase::Running(Direction::Download);
            }
            EngineEvent::DownloadMeasurement(m) => {
                if let Some(mbps) = m.client_mbps() {
                    self.state.last_download_mbps = mbps.max(0.0);
                    self.state.gauge_mbps = self.state.last_download_mbps;
                }
                if let Some(min_rtt_us) = m.server_min_rtt_us() {
                    self.state.latency_ms = Some(min_rtt_to_ms(min_rtt_us));
                    self.state.latency_source = Some(LatencySource::Server);
                }
            }
            EngineEvent::DownloadComplete => {}
            EngineEvent::UploadStart => {
                self.state.phase = SessionPhase::Running(Direction::Upload);
            }
            EngineEvent::UploadMeasurement(m) => {
                if let Some(mbps) = m.client_mbps() {
                    self.state.last_upload_mbps = mbps.max(0.0);
                    self.state.gauge_mbps = self.state.last_upload_mbps;
                }
            }
            EngineEvent::UploadComplete => return self.complete(),
            EngineEvent::Error(detail) => {
                self.fail(format!("Error: {}", detail));
            }
        }
        Vec::new()
    }

    /// The engine invocation returned. Faults it raised fail the session;
    /// a status code is only informative unless the session is still
    /// running, which means the engine ended without finishing the test.
    pub fn on_engine_exit(&mut self, generation: u64, result: Result<i32, SpeedError>) {
        if !self.accepts(generation) {
            if let Err(e) = result {
                tracing::debug!(generation, error = %e, "late engine fault dropped");
            }
            return;
        }

        match result {
            Err(e) => self.fail(format!("Error: {}", e)),
            Ok(code) => self.fail(format!(
                "Error: {}",
                SpeedError::engine(format!(
                    "measurement engine exited (status {}) before the upload test completed",
                    code
                ))
            )),
        }
    }

    /// Result of the latency probe; a server MinRTT sample always wins
    pub fn on_latency_probe(&mut self, generation: u64, latency_ms: Option<u64>) {
        if !self.accepts(generation) {
            return;
        }
        if self.state.latency_source == Some(LatencySource::Server) {
            return;
        }
        self.state.latency_ms = latency_ms;
        self.state.latency_source = latency_ms.map(|_| LatencySource::Probe);
    }

    /// Fire due timers. Returns true when something changed.
    pub fn poll_timers(&mut self, now: Instant) -> bool {
        let mut changed = false;

        if let Some(deadline) = self.state.safety_deadline
            && deadline <= now
        {
            self.state.safety_deadline = None;
            if self.state.running() && self.state.has_no_samples() {
                tracing::warn!(generation = self.state.generation, "safety timer fired");
                self.fail(format!(
                    "Error: {}",
                    SpeedError::Timeout(self.settings.safety_timeout)
                ));
            }
            changed = true;
        }

        if let Some(at) = self.state.stopped_label_at
            && at <= now
        {
            self.state.stopped_label_at = None;
            self.state.server_label = LABEL_STOPPED.to_string();
            changed = true;
        }

        changed
    }

    fn complete(&mut self) -> Vec<Action> {
        self.state.safety_deadline = None;
        let entry = HistoryEntry::new(
            self.state.last_download_mbps,
            self.state.last_upload_mbps,
            self.state.latency_ms,
        );
        tracing::info!(
            download_mbps = entry.download_mbps,
            upload_mbps = entry.upload_mbps,
            latency_ms = ?entry.latency_ms,
            "session completed"
        );
        self.history.record(entry.clone());
        self.state.last_outcome = Some(Outcome::Completed(entry.clone()));
        self.state.phase = SessionPhase::Idle;
        vec![Action::Persist(entry)]
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(generation = self.state.generation, %message, "session failed");
        self.state.safety_deadline = None;
        self.state.server_label = message.clone();
        self.state.last_outcome = Some(Outcome::Failed(message));
        self.state.phase = SessionPhase::Idle;
    }
}
