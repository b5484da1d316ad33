//! Adapter for the reference ndt7 command line client.
//!
//! Runs `ndt7-client -format=json` against the chosen server and turns its
//! line-delimited JSON output into [`EngineEvent`]s. Each line looks like
//! `{"Key":"measurement","Value":{"Origin":"client","Test":"download",...}}`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{EngineConfig, EngineEvent, EngineSink, Measurement, MeasurementEngine};
use crate::error::{Result, SpeedError};
use crate::state::ServerCandidate;

/// Default program name, looked up on PATH
pub const DEFAULT_NDT7_CLIENT: &str = "ndt7-client";

/// One output line of the client
#[derive(Debug, Deserialize)]
struct Batch {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value", default)]
    value: Payload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Payload {
    test: Option<String>,
    origin: Option<String>,
    failure: Option<String>,
    app_info: Option<AppInfo>,
    #[serde(rename = "TCPInfo")]
    tcp_info: Option<TcpInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AppInfo {
    num_bytes: f64,
    /// Microseconds since the test started
    elapsed_time: f64,
}

#[derive(Debug, Deserialize)]
struct TcpInfo {
    #[serde(rename = "MinRTT", default)]
    min_rtt: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Test {
    Download,
    Upload,
}

impl Payload {
    fn test(&self) -> Option<Test> {
        match self.test.as_deref() {
            Some("download") => Some(Test::Download),
            Some("upload") => Some(Test::Upload),
            _ => None,
        }
    }

    fn measurement(&self) -> Option<Measurement> {
        match self.origin.as_deref() {
            Some("client") => {
                let info = self.app_info.as_ref()?;
                if info.elapsed_time <= 0.0 {
                    return None;
                }
                // bits per microsecond is Mbit/s
                Some(Measurement::client(info.num_bytes * 8.0 / info.elapsed_time))
            }
            Some("server") => {
                let min_rtt = self.tcp_info.as_ref()?.min_rtt?;
                Some(Measurement::server_rtt(min_rtt))
            }
            _ => None,
        }
    }
}

/// Translate one output line into zero or one engine event
pub(crate) fn translate_line(line: &str) -> Option<EngineEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let batch: Batch = match serde_json::from_str(line) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(error = %e, line, "skipping unparseable ndt7-client output");
            return None;
        }
    };

    let test = batch.value.test();
    match (batch.key.as_str(), test) {
        ("starting", Some(Test::Download)) => Some(EngineEvent::DownloadStart),
        ("starting", Some(Test::Upload)) => Some(EngineEvent::UploadStart),
        ("measurement", Some(Test::Download)) => batch
            .value
            .measurement()
            .map(EngineEvent::DownloadMeasurement),
        ("measurement", Some(Test::Upload)) => batch
            .value
            .measurement()
            .map(EngineEvent::UploadMeasurement),
        ("complete", Some(Test::Download)) => Some(EngineEvent::DownloadComplete),
        ("complete", Some(Test::Upload)) => Some(EngineEvent::UploadComplete),
        ("error", _) => {
            let failure = batch
                .value
                .failure
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            Some(EngineEvent::Error(match batch.value.test.as_deref() {
                Some(t) => format!("{} test failed: {}", t, failure),
                None => failure,
            }))
        }
        _ => None,
    }
}

/// Command line arguments selecting the server
fn server_args(server: &ServerCandidate) -> Option<Vec<String>> {
    if let Some(url) = server.download_url() {
        return Some(vec![format!("-service-url={}", url)]);
    }
    server
        .machine
        .as_ref()
        .map(|host| vec![format!("-server={}", host)])
}

/// Runs the external `ndt7-client` program
#[derive(Debug, Clone)]
pub struct Ndt7ClientEngine {
    program: PathBuf,
}

impl Default for Ndt7ClientEngine {
    fn default() -> Self {
        Self::new(DEFAULT_NDT7_CLIENT)
    }
}

impl Ndt7ClientEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl MeasurementEngine for Ndt7ClientEngine {
    async fn run(&self, config: EngineConfig, sink: EngineSink) -> Result<i32> {
        if !config.data_policy_accepted {
            return Err(SpeedError::engine(
                "the M-Lab data policy has not been accepted",
            ));
        }

        sink.emit(EngineEvent::ServerDiscovery);
        let server = config
            .target()
            .ok_or_else(|| SpeedError::engine("no measurement server to test against"))?;
        let args = server_args(&server)
            .ok_or_else(|| SpeedError::engine("chosen server has no hostname or service URL"))?;
        sink.emit(EngineEvent::ServerChosen(server));

        tracing::info!(program = %self.program.display(), ?args, "starting ndt7-client");
        let mut child = Command::new(&self.program)
            .arg("-format=json")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SpeedError::engine(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "ndt7_client", "{}", line);
                }
            })
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpeedError::engine("ndt7-client stdout unavailable"))?;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(event) = translate_line(&line) {
                sink.emit(event);
            }
        }

        let status = child.wait().await?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }
        let code = status.code().unwrap_or(-1);
        tracing::info!(code, "ndt7-client exited");
        Ok(code)
    }
}
