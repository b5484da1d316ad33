//! Measurement engine seam.
//!
//! The throughput test itself belongs to an external engine. This module
//! fixes the signals such an engine emits and the configuration it gets;
//! `ndt7` adapts the reference ndt7 command line client to it.

pub mod ndt7;

use std::future::Future;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::state::ServerCandidate;

pub use ndt7::Ndt7ClientEngine;

/// Which side computed a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Client,
    Server,
}

/// One measurement sample from a test phase
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub origin: Origin,
    /// Mean throughput seen by the client, in Mbit/s
    pub mean_client_mbps: Option<f64>,
    /// Minimum round-trip time seen by the server's TCP stack, in microseconds
    pub min_rtt_us: Option<f64>,
}

impl Measurement {
    pub fn client(mbps: f64) -> Self {
        Self {
            origin: Origin::Client,
            mean_client_mbps: Some(mbps),
            min_rtt_us: None,
        }
    }

    pub fn server_rtt(min_rtt_us: f64) -> Self {
        Self {
            origin: Origin::Server,
            mean_client_mbps: None,
            min_rtt_us: Some(min_rtt_us),
        }
    }

    /// Throughput if this is a client-side sample
    pub fn client_mbps(&self) -> Option<f64> {
        match self.origin {
            Origin::Client => self.mean_client_mbps.filter(|v| v.is_finite()),
            Origin::Server => None,
        }
    }

    /// MinRTT if this is a server-side sample
    pub fn server_min_rtt_us(&self) -> Option<f64> {
        match self.origin {
            Origin::Server => self.min_rtt_us,
            Origin::Client => None,
        }
    }
}

/// Lifecycle signals, in the order a combined test emits them
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ServerDiscovery,
    ServerChosen(ServerCandidate),
    DownloadStart,
    DownloadMeasurement(Measurement),
    DownloadComplete,
    UploadStart,
    UploadMeasurement(Measurement),
    UploadComplete,
    Error(String),
}

/// Configuration handed to an engine for one combined test
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// The M-Lab data policy has been acknowledged
    pub data_policy_accepted: bool,
    /// Explicit server hostname; skips any discovery
    pub server_override: Option<String>,
    /// Discovery results, best first
    pub candidates: Vec<ServerCandidate>,
    /// Discovery service the engine may fall back to
    pub locate_url: Option<String>,
}

impl EngineConfig {
    /// Server the engine should connect to
    pub fn target(&self) -> Option<ServerCandidate> {
        match self.server_override {
            Some(ref host) => Some(ServerCandidate::from_hostname(host)),
            None => self.candidates.first().cloned(),
        }
    }
}

/// Event tagged with the session it belongs to
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Where an engine delivers its signals
///
/// Every event is tagged with the session generation so that a late event
/// from an abandoned run can be told apart from the current one.
#[derive(Debug, Clone)]
pub struct EngineSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EngineSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event; returns false once nobody is listening
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// External measurement engine
///
/// `run` performs a download test followed by an upload test, emitting
/// [`EngineEvent`]s through the sink, and resolves to a status code where 0
/// is success. Failures during the test are reported through
/// [`EngineEvent::Error`]; an `Err` means the engine could not be invoked.
/// There is no cancellation: a run always continues to its natural end.
pub trait MeasurementEngine: Send + Sync + 'static {
    fn run(
        &self,
        config: EngineConfig,
        sink: EngineSink,
    ) -> impl Future<Output = Result<i32>> + Send;
}
