//! Async driver around [`SessionController`].
//!
//! A single task owns the controller. Commands, engine events, background
//! results and timers are all funnelled into it, so every state mutation
//! happens on one task. After each step the observable state is published
//! on a watch channel.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::machine::{Action, SessionController};
use crate::engine::{EngineConfig, EngineSink, MeasurementEngine, TaggedEvent};
use crate::error::SpeedError;
use crate::latency::{LatencyProber, RoundTrip};
use crate::locate::{LocateResolver, LocateResult, LocateTransport};
use crate::state::{History, Outcome, Snapshot};

/// User commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

/// Results of background work, tagged with the session that asked for it
enum TaskDone {
    Located {
        generation: u64,
        result: LocateResult,
    },
    Probed {
        generation: u64,
        latency_ms: Option<u64>,
    },
    EngineExit {
        generation: u64,
        result: Result<i32, SpeedError>,
    },
}

/// Collaborators the driver calls out to
pub struct Services<T, R, E> {
    pub resolver: Arc<LocateResolver<T>>,
    pub prober: Arc<LatencyProber<R>>,
    pub engine: Arc<E>,
    /// Round trips per latency probe
    pub latency_iterations: u32,
    /// Where history is persisted; `None` keeps it in memory only
    pub history_path: Option<PathBuf>,
}

/// Cloneable front end of a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ControllerHandle {
    /// Request a new session; false if the controller has shut down
    pub fn start(&self) -> bool {
        self.commands.send(Command::Start).is_ok()
    }

    /// Request a stop of the active session
    pub fn stop(&self) -> bool {
        self.commands.send(Command::Stop).is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Latest published state
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Start a session and wait for it to end.
    ///
    /// Returns `None` if the controller shut down first or a session was
    /// already active.
    pub async fn run_once(&self) -> Option<Outcome> {
        let mut rx = self.subscribe();
        let before = rx.borrow_and_update().clone();
        if before.running || !self.start() {
            return None;
        }
        loop {
            rx.changed().await.ok()?;
            let snap = rx.borrow_and_update().clone();
            if snap.generation > before.generation && !snap.running {
                return snap.last_outcome;
            }
        }
    }
}

/// Spawn the driver task.
///
/// The task ends when `cancel` fires or every handle has been dropped.
pub fn spawn_controller<T, R, E>(
    controller: SessionController,
    services: Services<T, R, E>,
    cancel: CancellationToken,
) -> (ControllerHandle, JoinHandle<()>)
where
    T: LocateTransport + 'static,
    R: RoundTrip + 'static,
    E: MeasurementEngine,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (snap_tx, snap_rx) = watch::channel(controller.snapshot());
    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    let (task_tx, task_rx) = mpsc::unbounded_channel();

    let driver = Driver {
        controller,
        services,
        engine_tx,
        task_tx,
        snapshots: snap_tx,
    };
    let handle = tokio::spawn(driver.run(cmd_rx, engine_rx, task_rx, cancel));

    (
        ControllerHandle {
            commands: cmd_tx,
            snapshots: snap_rx,
        },
        handle,
    )
}

struct Driver<T, R, E> {
    controller: SessionController,
    services: Services<T, R, E>,
    engine_tx: mpsc::UnboundedSender<TaggedEvent>,
    task_tx: mpsc::UnboundedSender<TaskDone>,
    snapshots: watch::Sender<Snapshot>,
}

impl<T, R, E> Driver<T, R, E>
where
    T: LocateTransport + 'static,
    R: RoundTrip + 'static,
    E: MeasurementEngine,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut engine_rx: mpsc::UnboundedReceiver<TaggedEvent>,
        mut task_rx: mpsc::UnboundedReceiver<TaskDone>,
        cancel: CancellationToken,
    ) {
        loop {
            let deadline = self.controller.next_deadline();
            let actions = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(Command::Start) => self.controller.start(Instant::now()),
                    Some(Command::Stop) => {
                        self.controller.stop(Instant::now());
                        Vec::new()
                    }
                    None => break,
                },
                Some(tagged) = engine_rx.recv() => self.controller.on_engine_event(tagged),
                Some(done) = task_rx.recv() => self.on_task_done(done, &mut engine_rx),
                _ = wait_until(deadline) => {
                    self.controller.poll_timers(Instant::now());
                    Vec::new()
                }
            };

            for action in actions {
                self.execute(action).await;
            }
            self.snapshots.send_replace(self.controller.snapshot());
        }
        tracing::debug!("controller loop exited");
    }

    fn on_task_done(
        &mut self,
        done: TaskDone,
        engine_rx: &mut mpsc::UnboundedReceiver<TaggedEvent>,
    ) -> Vec<Action> {
        match done {
            TaskDone::Located { generation, result } => {
                self.controller.on_located(generation, result)
            }
            TaskDone::Probed {
                generation,
                latency_ms,
            } => {
                self.controller.on_latency_probe(generation, latency_ms);
                Vec::new()
            }
            TaskDone::EngineExit { generation, result } => {
                // Everything the engine emitted was sent before it returned
                let mut actions = Vec::new();
                while let Ok(tagged) = engine_rx.try_recv() {
                    actions.extend(self.controller.on_engine_event(tagged));
                }
                self.controller.on_engine_exit(generation, result);
                actions
            }
        }
    }

    async fn execute(&mut self, action: Action) {
        match action {
            Action::Resolve {
                generation,
                server_override,
                max_attempts,
            } => {
                let resolver = Arc::clone(&self.services.resolver);
                let tx = self.task_tx.clone();
                tokio::spawn(async move {
                    let result = resolver
                        .resolve(server_override.as_deref(), max_attempts)
                        .await;
                    let _ = tx.send(TaskDone::Located { generation, result });
                });
            }
            Action::StartEngine { generation, config } => {
                self.start_engine(generation, config);
            }
            Action::ProbeLatency { generation } => {
                let prober = Arc::clone(&self.services.prober);
                let iterations = self.services.latency_iterations;
                let tx = self.task_tx.clone();
                tokio::spawn(async move {
                    let latency_ms = prober.probe(iterations).await;
                    let _ = tx.send(TaskDone::Probed {
                        generation,
                        latency_ms,
                    });
                });
            }
            Action::Persist(_) => {
                if let Some(path) = self.services.history_path.clone() {
                    persist(self.controller.history().clone(), path).await;
                }
            }
        }
    }

    fn start_engine(&self, generation: u64, config: EngineConfig) {
        let engine = Arc::clone(&self.services.engine);
        let sink = EngineSink::new(generation, self.engine_tx.clone());
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            let result = engine.run(config, sink).await;
            let _ = tx.send(TaskDone::EngineExit { generation, result });
        });
    }
}

async fn persist(history: History, path: PathBuf) {
    let saved = tokio::task::spawn_blocking(move || {
        let result = history.save(&path);
        (result, path)
    })
    .await;
    match saved {
        Ok((Ok(()), path)) => tracing::debug!(path = %path.display(), "history saved"),
        Ok((Err(e), path)) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to save history")
        }
        Err(e) => tracing::warn!(error = %e, "history save task failed"),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
