//! End-to-end session flows through the controller task
//!
//! Discovery, the latency endpoint and the measurement engine are replaced
//! by scripted fakes; time is paused so retries and timers run instantly.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ndtspeed::controller::{
    ControllerHandle, ControllerSettings, Services, SessionController, spawn_controller,
};
use ndtspeed::engine::{EngineConfig, EngineEvent, EngineSink, Measurement, MeasurementEngine};
use ndtspeed::error::{Result, SpeedError};
use ndtspeed::latency::{LatencyProber, RoundTrip};
use ndtspeed::locate::{HttpReply, LocateResolver, LocateTransport};
use ndtspeed::state::session::{LABEL_STOPPED, LABEL_STOPPING};
use ndtspeed::state::{History, Outcome};

const NAIROBI: &str = r#"{"results":[{
    "machine":"mlab1-nbo01.mlab-oti.measurement-lab.org",
    "site":"abc01",
    "location":{"city":"Nairobi","country":"KE"},
    "urls":{"wss:///ndt/v7/download":"wss://ndt-mlab1-nbo01.mlab-oti.measurement-lab.org/ndt/v7/download?access_token=x"}
}]}"#;

/// Discovery that answers every call the same way
struct FakeLocate {
    reply: Option<HttpReply>,
    calls: Arc<AtomicU32>,
}

impl FakeLocate {
    fn ok(body: &str) -> Self {
        Self {
            reply: Some(HttpReply {
                status: 200,
                body: body.to_string(),
            }),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    fn unreachable() -> Self {
        Self {
            reply: None,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl LocateTransport for FakeLocate {
    async fn fetch(&self, _url: &str) -> Result<HttpReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Some(ref reply) => Ok(reply.clone()),
            None => Err(SpeedError::Transport("dns error: no such host".into())),
        }
    }
}

/// Round trip taking a fixed time
struct FixedRoundTrip(Duration);

impl RoundTrip for FixedRoundTrip {
    async fn round_trip(&self) -> Result<()> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

enum Step {
    Emit(EngineEvent),
    Sleep(Duration),
}

/// Engine replaying a fixed script, then returning `status`
struct ScriptedEngine {
    script: Vec<Step>,
    status: i32,
    configs: Mutex<Vec<EngineConfig>>,
}

impl ScriptedEngine {
    fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            status: 0,
            configs: Mutex::new(Vec::new()),
        }
    }
}

impl MeasurementEngine for ScriptedEngine {
    async fn run(&self, config: EngineConfig, sink: EngineSink) -> Result<i32> {
        let target = config.target();
        self.configs.lock().push(config);

        sink.emit(EngineEvent::ServerDiscovery);
        if let Some(server) = target {
            sink.emit(EngineEvent::ServerChosen(server));
        }
        for step in &self.script {
            match step {
                Step::Emit(event) => {
                    sink.emit(event.clone());
                }
                Step::Sleep(d) => tokio::time::sleep(*d).await,
            }
        }
        Ok(self.status)
    }
}

fn full_run() -> Vec<Step> {
    use EngineEvent::*;
    vec![
        Step::Emit(DownloadStart),
        Step::Sleep(Duration::from_millis(250)),
        Step::Emit(DownloadMeasurement(Measurement::client(5.2))),
        Step::Sleep(Duration::from_millis(250)),
        Step::Emit(DownloadMeasurement(Measurement::server_rtt(18000.0))),
        Step::Emit(DownloadMeasurement(Measurement::client(7.9))),
        Step::Sleep(Duration::from_millis(250)),
        Step::Emit(DownloadMeasurement(Measurement::client(6.1))),
        Step::Emit(DownloadComplete),
        Step::Emit(UploadStart),
        Step::Sleep(Duration::from_millis(250)),
        Step::Emit(UploadMeasurement(Measurement::client(2.4))),
        Step::Emit(UploadComplete),
    ]
}

struct Harness {
    handle: ControllerHandle,
    locate_calls: Arc<AtomicU32>,
    engine: Arc<ScriptedEngine>,
    cancel: CancellationToken,
    _dir: tempfile::TempDir,
    history_path: std::path::PathBuf,
}

fn harness(
    settings: ControllerSettings,
    locate: FakeLocate,
    engine: ScriptedEngine,
    probe_ms: u64,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");
    let locate_calls = Arc::clone(&locate.calls);
    let engine = Arc::new(engine);

    let services = Services {
        resolver: Arc::new(LocateResolver::new(locate, "http://locate.invalid/v2")),
        prober: Arc::new(LatencyProber::new(FixedRoundTrip(Duration::from_millis(probe_ms)))),
        engine: Arc::clone(&engine),
        latency_iterations: 5,
        history_path: Some(history_path.clone()),
    };
    let cancel = CancellationToken::new();
    let (handle, _task) = spawn_controller(
        SessionController::new(settings, History::new()),
        services,
        cancel.clone(),
    );

    Harness {
        handle,
        locate_calls,
        engine,
        cancel,
        _dir: dir,
        history_path,
    }
}

/// Wait until the published snapshot satisfies `pred`
async fn wait_for(handle: &ControllerHandle, pred: impl Fn(&ndtspeed::state::Snapshot) -> bool) {
    let mut rx = handle.subscribe();
    loop {
        if pred(&rx.borrow_and_update()) {
            return;
        }
        rx.changed().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_nairobi_run_completes_and_records_history() {
    let h = harness(
        ControllerSettings::default(),
        FakeLocate::ok(NAIROBI),
        ScriptedEngine::new(full_run()),
        42,
    );

    let outcome = h.handle.run_once().await;
    let Some(Outcome::Completed(entry)) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };

    assert_eq!(entry.download_mbps, 6.1);
    assert_eq!(entry.upload_mbps, 2.4);
    // server MinRTT wins over the slower probe
    assert_eq!(entry.latency_ms, Some(18));

    let snap = h.handle.snapshot();
    assert!(!snap.running);
    assert_eq!(snap.server_label, "Server: Nairobi (abc01)");
    assert_eq!(snap.history.len(), 1);
    assert_eq!(h.locate_calls.load(Ordering::SeqCst), 1);

    let saved = History::load(&h.history_path).unwrap();
    assert_eq!(saved.entries(), &[entry][..]);

    let configs = h.engine.configs.lock();
    assert_eq!(configs.len(), 1);
    assert!(configs[0].data_policy_accepted);
    assert_eq!(configs[0].candidates[0].site.as_deref(), Some("abc01"));
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_probe_latency_used_without_server_rtt() {
    use EngineEvent::*;
    let script = vec![
        Step::Emit(DownloadStart),
        Step::Emit(DownloadMeasurement(Measurement::client(10.0))),
        Step::Sleep(Duration::from_secs(1)),
        Step::Emit(UploadStart),
        Step::Emit(UploadMeasurement(Measurement::client(1.0))),
        Step::Emit(UploadComplete),
    ];
    let h = harness(
        ControllerSettings::default(),
        FakeLocate::ok(NAIROBI),
        ScriptedEngine::new(script),
        42,
    );

    let Some(Outcome::Completed(entry)) = h.handle.run_once().await else {
        panic!("expected completion");
    };
    assert_eq!(entry.latency_ms, Some(42));
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_override_skips_discovery() {
    let settings = ControllerSettings {
        server_override: Some("ndt-mlab1-nbo01.mlab-oti.measurement-lab.org".into()),
        ..Default::default()
    };
    let h = harness(
        settings,
        FakeLocate::ok(NAIROBI),
        ScriptedEngine::new(full_run()),
        10,
    );

    assert!(matches!(h.handle.run_once().await, Some(Outcome::Completed(_))));
    assert_eq!(h.locate_calls.load(Ordering::SeqCst), 0);

    let configs = h.engine.configs.lock();
    assert_eq!(
        configs[0].server_override.as_deref(),
        Some("ndt-mlab1-nbo01.mlab-oti.measurement-lab.org")
    );
    assert!(configs[0].candidates.is_empty());
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_discovery_exhaustion_fails_with_hint() {
    let settings = ControllerSettings {
        max_attempts: 3,
        ..Default::default()
    };
    let h = harness(
        settings,
        FakeLocate::unreachable(),
        ScriptedEngine::new(full_run()),
        10,
    );

    let started = Instant::now();
    let outcome = h.handle.run_once().await;
    let elapsed = started.elapsed();

    let Some(Outcome::Failed(message)) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.starts_with("Error: could not locate a measurement server"));
    assert!(message.contains("3 attempt(s)"));
    assert!(message.contains("no such host"));
    assert!(message.contains("--server"));

    // waits of 2000 and 4000 ms, each with up to 500 ms of jitter
    assert!(elapsed >= Duration::from_millis(6000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(7000), "{:?}", elapsed);

    assert_eq!(h.locate_calls.load(Ordering::SeqCst), 3);
    assert!(h.engine.configs.lock().is_empty());
    assert!(h.handle.snapshot().history.is_empty());
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_safety_timeout_fails_silent_engine() {
    let script = vec![Step::Sleep(Duration::from_secs(120))];
    let h = harness(
        ControllerSettings::default(),
        FakeLocate::ok(NAIROBI),
        ScriptedEngine::new(script),
        10,
    );

    let started = Instant::now();
    let outcome = h.handle.run_once().await;
    let elapsed = started.elapsed();

    let Some(Outcome::Failed(message)) = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(message.contains("timed out"));
    assert!(elapsed >= Duration::from_secs(45));
    assert!(elapsed < Duration::from_secs(46));

    let snap = h.handle.snapshot();
    assert!(!snap.running);
    assert_eq!(snap.download_mbps, 0.0);
    assert_eq!(snap.upload_mbps, 0.0);
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_engine_error_signal_fails_session() {
    let script = vec![
        Step::Emit(EngineEvent::DownloadStart),
        Step::Emit(EngineEvent::Error("download test failed: websocket: close 1006".into())),
    ];
    let mut engine = ScriptedEngine::new(script);
    engine.status = 1;
    let h = harness(ControllerSettings::default(), FakeLocate::ok(NAIROBI), engine, 10);

    let outcome = h.handle.run_once().await;
    assert_eq!(
        outcome,
        Some(Outcome::Failed(
            "Error: download test failed: websocket: close 1006".into()
        ))
    );
    assert!(h.handle.snapshot().history.is_empty());
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_stop_suppresses_late_engine_events() {
    use EngineEvent::*;
    let script = vec![
        Step::Emit(DownloadStart),
        Step::Emit(DownloadMeasurement(Measurement::client(40.0))),
        Step::Sleep(Duration::from_secs(2)),
        Step::Emit(DownloadMeasurement(Measurement::client(80.0))),
        Step::Emit(UploadStart),
        Step::Emit(UploadMeasurement(Measurement::client(9.0))),
        Step::Emit(UploadComplete),
    ];
    let h = harness(
        ControllerSettings::default(),
        FakeLocate::ok(NAIROBI),
        ScriptedEngine::new(script),
        10,
    );

    h.handle.start();
    wait_for(&h.handle, |s| s.download_mbps == 40.0).await;

    let stop_requested = Instant::now();
    h.handle.stop();
    wait_for(&h.handle, |s| s.server_label == LABEL_STOPPING).await;
    wait_for(&h.handle, |s| s.server_label == LABEL_STOPPED).await;
    assert!(stop_requested.elapsed() >= Duration::from_millis(800));

    // let the abandoned engine run to its end
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snap = h.handle.snapshot();
    assert!(!snap.running);
    assert_eq!(snap.download_mbps, 40.0);
    assert_eq!(snap.gauge_mbps, 40.0);
    assert_eq!(snap.upload_mbps, 0.0);
    assert!(snap.history.is_empty());
    assert_eq!(snap.last_outcome, Some(Outcome::Stopped));
    assert!(!h.history_path.exists());
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_restart_ignores_previous_engine() {
    use EngineEvent::*;
    let script = vec![
        Step::Emit(DownloadStart),
        Step::Emit(DownloadMeasurement(Measurement::client(40.0))),
        Step::Sleep(Duration::from_secs(3)),
        Step::Emit(UploadStart),
        Step::Emit(UploadMeasurement(Measurement::client(4.0))),
        Step::Emit(UploadComplete),
    ];
    let h = harness(
        ControllerSettings::default(),
        FakeLocate::ok(NAIROBI),
        ScriptedEngine::new(script),
        10,
    );

    h.handle.start();
    wait_for(&h.handle, |s| s.download_mbps == 40.0).await;
    h.handle.stop();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // the second run completes once; the first engine's completion
    // lands a second earlier and must not produce an entry
    let Some(Outcome::Completed(entry)) = h.handle.run_once().await else {
        panic!("expected completion");
    };
    assert_eq!(entry.upload_mbps, 4.0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let snap = h.handle.snapshot();
    assert_eq!(snap.generation, 2);
    assert_eq!(snap.history.len(), 1);
    assert_eq!(h.engine.configs.lock().len(), 2);
    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_start_is_single_flight() {
    let h = harness(
        ControllerSettings::default(),
        FakeLocate::ok(NAIROBI),
        ScriptedEngine::new(full_run()),
        10,
    );

    h.handle.start();
    h.handle.start();
    h.handle.start();
    wait_for(&h.handle, |s| s.generation == 1 && !s.running && s.last_outcome.is_some()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snap = h.handle.snapshot();
    assert_eq!(snap.generation, 1);
    assert_eq!(snap.history.len(), 1);
    assert_eq!(h.locate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.engine.configs.lock().len(), 1);
    h.cancel.cancel();
}
