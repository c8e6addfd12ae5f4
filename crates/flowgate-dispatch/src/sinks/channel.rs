// flowgate-dispatch/src/sinks/channel.rs
// ============================================================================
// Module: Channel Sink
// Description: AfterHookSink implementation delivering events over an
//              in-process tokio mpsc channel.
// Purpose: Let embedded callers observe after-hook events without a network
//          round-trip, e.g. to drive an in-process notification feed.
// Dependencies: flowgate-core, tokio
// ============================================================================

use async_trait::async_trait;
use flowgate_core::interfaces::AfterHookSink;
use serde_json::Value;
use tokio::sync::mpsc::Sender;

/// A delivered event, as handed to a [`ChannelSink`]'s receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchMessage {
    /// Name of the dispatched event.
    pub event_name: String,
    /// Event payload.
    pub payload: Value,
}

/// Delivers events to an in-process `tokio` channel.
///
/// # Invariants
/// - Delivery fails if the receiver has been dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    /// Sending half of the channel events are forwarded to.
    sender: Sender<DispatchMessage>,
}

impl ChannelSink {
    /// Creates a sink forwarding deliveries to `sender`.
    #[must_use]
    pub const fn new(sender: Sender<DispatchMessage>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl AfterHookSink for ChannelSink {
    async fn deliver(&self, event_name: &str, payload: &Value) -> Result<(), String> {
        let message = DispatchMessage { event_name: event_name.to_string(), payload: payload.clone() };
        self.sender.send(message).await.map_err(|_err| "channel sink receiver dropped".to_string())
    }
}
