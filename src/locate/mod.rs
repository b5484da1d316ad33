//! Measurement server discovery
//!
//! Resolves a server either from a manual hostname override or by querying
//! the discovery service, retrying with backoff because the service is
//! shared and rate-limited.

pub mod resolver;
pub mod retry;
pub mod transport;

pub use resolver::{DEFAULT_LOCATE_URL, LocateResolver, LocateResult, is_valid_override};
pub use retry::{Backoff, Exhausted, retry_with_backoff};
pub use transport::{HttpReply, HttpTransport, LocateTransport};
