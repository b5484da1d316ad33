use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ndtspeed::cli::Args;
use ndtspeed::config::Config;
use ndtspeed::controller::{ControllerHandle, Services, SessionController, spawn_controller};
use ndtspeed::engine::Ndt7ClientEngine;
use ndtspeed::export::{
    export_csv, export_entry_json, export_json, format_mbps, generate_report, history_line,
};
use ndtspeed::latency::{HttpRoundTrip, LatencyProber};
use ndtspeed::locate::{DEFAULT_LOCATE_URL, HttpTransport, LocateResolver, is_valid_override};
use ndtspeed::logging::init_logging;
use ndtspeed::prefs::Prefs;
use ndtspeed::proxy::{self, ProxyState};
use ndtspeed::state::{History, Outcome, SessionPhase};
use ndtspeed::tui::{Theme, run_tui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let interactive = !args.history && args.proxy.is_none() && !args.is_single_run();
    init_logging(interactive);

    // Handle history mode (no network needed)
    if args.history {
        return run_history_mode(&args);
    }

    // Setup Ctrl+C handler
    let interrupt = CancellationToken::new();
    let interrupt_clone = interrupt.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        interrupt_clone.cancel();
    });

    if let Some(addr) = args.proxy {
        return run_proxy_mode(&args, addr, interrupt).await;
    }

    let prefs = Prefs::load();
    let config = Config::new(&args, &prefs);
    if let Some(ref server) = config.server
        && !is_valid_override(server)
    {
        eprintln!(
            "Warning: ignoring invalid server '{}'; using automatic discovery",
            server
        );
    }

    let controller_cancel = CancellationToken::new();
    let (handle, task) = start_controller(&config, controller_cancel.clone())?;

    let success = if args.json {
        run_json_mode(&handle, interrupt).await?
    } else if args.no_tui {
        run_streaming_mode(&handle, interrupt).await?
    } else {
        run_interactive_mode(&args, &prefs, handle, interrupt).await?;
        true
    };

    controller_cancel.cancel();
    task.await.context("controller task failed")?;

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Wire the resolver, prober and engine into a running controller
fn start_controller(
    config: &Config,
    cancel: CancellationToken,
) -> Result<(ControllerHandle, JoinHandle<()>)> {
    let transport = HttpTransport::new(config.http_timeout)?;
    let round_trip = HttpRoundTrip::new(config.latency_url.clone(), config.http_timeout)?;

    // Never save over a file that could not be read
    let (history, history_path) = match config.history_path {
        Some(ref path) => match History::open(path) {
            Ok(history) => (history, Some(path.clone())),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "history unreadable and could not be moved; not saving this session"
                );
                (History::new(), None)
            }
        },
        None => (History::new(), None),
    };

    let services = Services {
        resolver: Arc::new(LocateResolver::new(transport, config.locate_url.clone())),
        prober: Arc::new(LatencyProber::new(round_trip)),
        engine: Arc::new(Ndt7ClientEngine::new(config.ndt7_client.clone())),
        latency_iterations: config.latency_probes,
        history_path,
    };
    let controller = SessionController::new(config.controller_settings(), history);

    Ok(spawn_controller(controller, services, cancel))
}

fn run_history_mode(args: &Args) -> Result<()> {
    let history = match Config::history_source(args) {
        Some(path) => History::load(&path)
            .with_context(|| format!("Failed to read history file: {}", path.display()))?,
        None => History::new(),
    };

    if args.json {
        export_json(history.entries(), std::io::stdout())?;
    } else if args.csv {
        export_csv(history.entries(), std::io::stdout())?;
    } else {
        generate_report(history.entries(), std::io::stdout())?;
    }
    Ok(())
}

async fn run_proxy_mode(
    args: &Args,
    addr: std::net::SocketAddr,
    cancel: CancellationToken,
) -> Result<()> {
    // Relay the real discovery service, never a configured proxy
    let upstream = args
        .locate_url
        .clone()
        .unwrap_or_else(|| DEFAULT_LOCATE_URL.to_string());
    let transport = HttpTransport::new(args.http_timeout_duration())?;
    let state = Arc::new(ProxyState::new(transport, upstream));

    eprintln!("Discovery proxy on http://{}/api/locate (Ctrl+C to stop)", addr);
    proxy::serve(addr, state, cancel)
        .await
        .with_context(|| format!("Failed to run proxy on {}", addr))?;
    Ok(())
}

/// One run, result printed as JSON. Returns false unless the run completed.
async fn run_json_mode(handle: &ControllerHandle, interrupt: CancellationToken) -> Result<bool> {
    let outcome = tokio::select! {
        outcome = handle.run_once() => outcome,
        _ = interrupt.cancelled() => {
            handle.stop();
            Some(Outcome::Stopped)
        }
    };

    match outcome {
        Some(Outcome::Completed(entry)) => {
            export_entry_json(&entry, std::io::stdout())?;
            Ok(true)
        }
        Some(Outcome::Failed(message)) => {
            eprintln!("{}", message);
            Ok(false)
        }
        Some(Outcome::Stopped) => {
            eprintln!("Stopped");
            Ok(false)
        }
        None => {
            eprintln!("Error: measurement controller exited unexpectedly");
            Ok(false)
        }
    }
}

/// One run, printing label, phase and rate changes as they happen
async fn run_streaming_mode(
    handle: &ControllerHandle,
    interrupt: CancellationToken,
) -> Result<bool> {
    let mut rx = handle.subscribe();
    let first_generation = rx.borrow_and_update().generation;
    handle.start();

    let mut last_label = String::new();
    let mut last_phase = SessionPhase::Idle;
    let mut last_gauge = String::new();
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = interrupt.cancelled(), if !interrupted => {
                interrupted = true;
                handle.stop();
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
                let snap = rx.borrow_and_update().clone();
                if snap.generation <= first_generation {
                    continue;
                }

                if snap.server_label != last_label {
                    println!("{}", snap.server_label);
                    last_label = snap.server_label.clone();
                }

                if snap.running {
                    let gauge = format_mbps(snap.gauge_mbps);
                    if snap.phase != last_phase || gauge != last_gauge {
                        if let SessionPhase::Running(_) = snap.phase {
                            println!("{:<9} {:>9} Mbps", snap.phase.label(), gauge);
                        }
                        last_phase = snap.phase;
                        last_gauge = gauge;
                    }
                    continue;
                }

                return Ok(match snap.last_outcome {
                    Some(Outcome::Completed(entry)) => {
                        println!("{}", history_line(&entry));
                        true
                    }
                    _ => false,
                });
            }
        }
    }
}

async fn run_interactive_mode(
    args: &Args,
    prefs: &Prefs,
    handle: ControllerHandle,
    interrupt: CancellationToken,
) -> Result<()> {
    // Determine theme: CLI override > saved preference > default
    let theme_name = if args.theme != "default" {
        &args.theme
    } else {
        prefs.theme.as_deref().unwrap_or("default")
    };
    let theme = Theme::by_name(theme_name);

    let final_theme = run_tui(handle, interrupt, theme).await?;

    // Save theme preference (best effort, don't fail on save error)
    let mut prefs = Prefs::load();
    prefs.theme = Some(final_theme);
    let _ = prefs.save();

    Ok(())
}
