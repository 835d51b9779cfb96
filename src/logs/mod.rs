//! C5 — Log Pipeline.
//!
//! [`pull`] implements the synchronous pull algorithm (§4.5) shared by the
//! plain HTTP log endpoints and the first frame of the push stream;
//! [`push`] wraps it in the ~1s poll loop used by the websocket surface.

pub mod pull;
pub mod push;

use serde::Serialize;

/// One engine-sourced or stored log entry, independent of its storage
/// representation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogEntry {
    pub node: String,
    pub pod: String,
    pub phase: String,
    pub logs: String,
}

/// Tags where a pull result came from, per §4.5 step 5-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Database,
    Kubernetes,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullResult {
    pub phase: String,
    pub source: LogSource,
    pub logs: Vec<LogEntry>,
    pub error: Option<String>,
}
