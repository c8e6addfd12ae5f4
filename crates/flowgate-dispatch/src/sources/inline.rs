// flowgate-dispatch/src/sources/inline.rs
// ============================================================================
// Module: Inline Event Source
// Description: In-memory FIFO event source, primarily for tests.
// Purpose: Let tests and embedded deployments feed externally-triggered
//          events into the dispatcher without standing up a transport.
// Dependencies: flowgate-core, tokio
// ============================================================================

use std::collections::VecDeque;

use async_trait::async_trait;
use flowgate_core::interfaces::EventSource;
use serde_json::Value;
use tokio::sync::Mutex;

/// An in-memory, order-preserving [`EventSource`] backed by a FIFO queue.
///
/// # Invariants
/// - Events are returned in the order they were pushed.
#[derive(Debug, Default)]
pub struct InlineEventSource {
    /// Pending events, oldest first.
    queue: Mutex<VecDeque<Value>>,
}

impl InlineEventSource {
    /// Creates an empty inline source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes an event to the back of the queue.
    pub async fn push(&self, event: Value) {
        self.queue.lock().await.push_back(event);
    }

    /// Returns the number of events currently queued.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Returns true when no events are queued.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[async_trait]
impl EventSource for InlineEventSource {
    async fn poll(&self) -> Result<Option<Value>, String> {
        Ok(self.queue.lock().await.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_polled_in_fifo_order() {
        let source = InlineEventSource::new();
        source.push(serde_json::json!({"name": "first"})).await;
        source.push(serde_json::json!({"name": "second"})).await;
        assert_eq!(source.poll().await.unwrap(), Some(serde_json::json!({"name": "first"})));
        assert_eq!(source.poll().await.unwrap(), Some(serde_json::json!({"name": "second"})));
        assert_eq!(source.poll().await.unwrap(), None);
    }

    #[tokio::test]
    async fn len_and_is_empty_reflect_queue_state() {
        let source = InlineEventSource::new();
        assert!(source.is_empty().await);
        source.push(serde_json::json!({})).await;
        assert_eq!(source.len().await, 1);
        assert!(!source.is_empty().await);
    }
}
