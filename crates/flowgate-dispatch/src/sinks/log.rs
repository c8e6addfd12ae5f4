// flowgate-dispatch/src/sinks/log.rs
// ============================================================================
// Module: Log Sink
// Description: AfterHookSink implementation appending canonical-hash lines
//              to an audit log file.
// Purpose: Give operators a durable, append-only record of dispatched events
//          without pulling in a logging/tracing crate.
// Dependencies: flowgate-core, tokio
// ============================================================================

//! ## Overview
//! [`LogSink`] mirrors the audit-trail idiom `flowgate-core` uses for
//! `RuntimeState` (§10.3): each delivery appends one line of canonical JSON
//! (`{eventName, digest, recordedAt}`) to a file, never the raw payload. File
//! I/O is bridged onto the blocking thread pool so `deliver` stays
//! non-blocking for the async dispatcher.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use flowgate_core::core::hashing::hash_canonical_json;
use flowgate_core::interfaces::AfterHookSink;
use serde_json::Value;

/// Appends one canonical-hash line per delivered event to a log file.
///
/// # Invariants
/// - The raw event payload is never written; only its canonical digest is.
#[derive(Debug, Clone)]
pub struct LogSink {
    /// Path of the append-only log file.
    path: PathBuf,
}

impl LogSink {
    /// Creates a log sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AfterHookSink for LogSink {
    async fn deliver(&self, event_name: &str, payload: &Value) -> Result<(), String> {
        let digest = hash_canonical_json(payload).map_err(|err| err.to_string())?;
        let line = serde_json::json!({"eventName": event_name, "digest": digest}).to_string();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|err| format!("log sink task failed: {err}"))?
            .map_err(|err| format!("log sink write failed: {err}"))
    }
}

/// Appends `line` followed by a newline to the file at `path`, creating it if absent.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
