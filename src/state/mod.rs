pub mod history;
pub mod server;
pub mod session;

pub use history::{History, HistoryEntry};
pub use server::{ServerCandidate, ServerLocation};
pub use session::{Direction, LatencySource, Outcome, SessionPhase, SessionState, Snapshot};
