// flowgate-dispatch/src/error.rs
// ============================================================================
// Module: Dispatch Error
// Description: Crate-wide error type for sinks and sources.
// Purpose: Give every sink/source a single stable error enum, converted to a
//          plain `String` at the `AfterHookSink`/`EventSource` trait boundary.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors produced by this crate's sinks and sources.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The target host failed policy checks (denylist, private range, unresolvable).
    #[error("host policy violation: {0}")]
    Policy(String),
    /// The underlying HTTP transport failed.
    #[error("http transport error: {0}")]
    Http(String),
    /// The payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Serialize(String),
    /// An I/O operation (e.g. appending to a log file) failed.
    #[error("io error: {0}")]
    Io(String),
    /// The receiving end of an in-process channel has been dropped.
    #[error("channel closed")]
    ChannelClosed,
}
